pub mod consent_service;
pub mod handle_service;
pub mod sweeper;
pub mod template_service;

pub use consent_service::{ConsentRequest, ConsentService};
pub use handle_service::{HandleRequest, HandleService};
pub use sweeper::{ExpirySweeper, SweepReport};
pub use template_service::{TemplateChanges, TemplateDraft, TemplateService};

use std::sync::Arc;

use crate::clock::SharedClock;
use crate::config::AppConfig;
use crate::database::{BusinessDirectory, DocumentStore, StoreBusinessDirectory, VersionedEntityStore};
use crate::integrity::IntegrityValidator;
use crate::tenancy::TenantRouter;

/// Everything the binary and the HTTP layer need, wired over one store
#[derive(Clone)]
pub struct Services {
    pub router: TenantRouter,
    pub validator: Arc<IntegrityValidator>,
    pub templates: TemplateService,
    pub handles: HandleService,
    pub consents: ConsentService,
    pub sweeper: Arc<ExpirySweeper>,
    pub clock: SharedClock,
    pub config: Arc<AppConfig>,
}

impl Services {
    pub fn new(store: Arc<dyn DocumentStore>, config: AppConfig, clock: SharedClock) -> Self {
        let router = TenantRouter::new(store, &config.tenancy);
        let directory: Arc<dyn BusinessDirectory> = Arc::new(StoreBusinessDirectory::new(router.clone()));
        Self::with_directory(router, directory, config, clock)
    }

    pub fn with_directory(
        router: TenantRouter,
        directory: Arc<dyn BusinessDirectory>,
        config: AppConfig,
        clock: SharedClock,
    ) -> Self {
        let validator = Arc::new(IntegrityValidator::new());
        let template_store = VersionedEntityStore::new(router.clone(), validator.clone(), clock.clone(), &config.integrity);
        let consent_store = VersionedEntityStore::new(router.clone(), validator.clone(), clock.clone(), &config.integrity);

        let templates = TemplateService::new(template_store.clone(), directory);
        let handles = HandleService::new(router.clone(), template_store.clone(), clock.clone(), config.handles.ttl());
        let consents = ConsentService::new(consent_store, template_store, handles.clone(), clock.clone());
        let sweeper = Arc::new(ExpirySweeper::new(
            router.clone(),
            clock.clone(),
            config.database.operation_timeout(),
        ));

        Self {
            router,
            validator,
            templates,
            handles,
            consents,
            sweeper,
            clock,
            config: Arc::new(config),
        }
    }

    /// Default per-operation deadline for request scopes
    pub fn deadline(&self) -> std::time::Duration {
        self.config.database.operation_timeout()
    }
}
