#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};

use consent_vault::clock::ManualClock;
use consent_vault::config::AppConfig;
use consent_vault::database::{Collection, Document, DocumentStore, MemoryStore, StorageError};
use consent_vault::filter::FilterData;
use consent_vault::models::{ConsentTemplate, LocalizedContent, PreferenceChoice, PreferenceDefinition, PreferenceStatus};
use consent_vault::services::{Services, TemplateDraft};
use consent_vault::tenancy::{with_tenant, Partition, TenantId, TenantScope};

pub const BUSINESS: &str = "biz-1";

pub struct Harness {
    pub services: Arc<Services>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub async fn new() -> Result<Self> {
        Self::over(Arc::new(MemoryStore::new())).await
    }

    pub async fn over(store: Arc<dyn DocumentStore>) -> Result<Self> {
        let clock = Arc::new(ManualClock::default());
        let services = Arc::new(Services::new(store, AppConfig::default(), clock.clone()));
        services.router.ensure_shared_partition().await?;
        Ok(Self { services, clock })
    }

    /// Provision `tenant` and register the default business in it
    pub async fn tenant(&self, raw: &str) -> Result<TenantId> {
        let tenant = TenantId::parse(raw)?;
        let partition = self.services.router.provision(&tenant).await?;
        self.raw_insert(
            &partition,
            Collection::BusinessApplications,
            json!({ "documentId": format!("{}-{}", raw, BUSINESS), "businessId": BUSINESS }),
        )
        .await?;
        Ok(tenant)
    }

    pub fn partition(&self, tenant: &TenantId) -> Partition {
        self.services.router.resolve_partition(tenant.as_str())
    }

    pub async fn raw_insert(&self, partition: &Partition, collection: Collection, value: Value) -> Result<()> {
        let document = value.as_object().cloned().ok_or_else(|| anyhow::anyhow!("not an object"))?;
        self.services.router.store().insert(partition, collection, document).await?;
        Ok(())
    }

    pub async fn raw_find(&self, partition: &Partition, collection: Collection, where_clause: Value) -> Result<Vec<Document>> {
        let found = self
            .services
            .router
            .store()
            .find(partition, collection, FilterData::where_only(where_clause))
            .await?;
        Ok(found)
    }

    /// Patch documents directly, bypassing the version store
    pub async fn raw_update(&self, partition: &Partition, collection: Collection, where_clause: Value, set: Value) -> Result<u64> {
        let set = set.as_object().cloned().ok_or_else(|| anyhow::anyhow!("not an object"))?;
        let patched = self
            .services
            .router
            .store()
            .update_many(partition, collection, where_clause, set)
            .await?;
        Ok(patched)
    }

    /// Run `f` inside a scope bound to `tenant`
    pub async fn scoped<F, Fut, T>(&self, tenant: &TenantId, f: F) -> T
    where
        F: FnOnce(TenantScope) -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        with_tenant(tenant.clone(), Duration::from_secs(5), f).await
    }

    /// Create and publish a template with one mandatory and one optional purpose
    pub async fn published_template(&self, tenant: &TenantId) -> Result<ConsentTemplate> {
        let services = self.services.clone();
        let template = self
            .scoped(tenant, |scope| async move {
                let created = services.templates.create_template(&scope, draft("Cookie banner")).await?;
                services.templates.publish_template(&scope, &created.meta.logical_id).await
            })
            .await?;
        Ok(template)
    }

    pub fn advance_minutes(&self, minutes: i64) {
        self.clock.advance(chrono::Duration::minutes(minutes));
    }
}

pub fn draft(name: &str) -> TemplateDraft {
    let mut content = BTreeMap::new();
    content.insert(
        "en".to_string(),
        LocalizedContent {
            title: "We value your privacy".to_string(),
            description: "Choose which cookies we may use".to_string(),
        },
    );
    TemplateDraft {
        business_id: BUSINESS.to_string(),
        name: name.to_string(),
        preferences: vec![
            PreferenceDefinition {
                purpose_id: "essential".to_string(),
                name: "Essential".to_string(),
                mandatory: true,
                validity_days: 365,
            },
            PreferenceDefinition {
                purpose_id: "marketing".to_string(),
                name: "Marketing".to_string(),
                mandatory: false,
                validity_days: 90,
            },
        ],
        content,
        ui_config: json!({ "theme": "dark" }),
    }
}

pub fn choices(essential: PreferenceChoice, marketing: PreferenceChoice) -> Vec<PreferenceStatus> {
    vec![
        PreferenceStatus {
            purpose_id: "essential".to_string(),
            status: essential,
        },
        PreferenceStatus {
            purpose_id: "marketing".to_string(),
            status: marketing,
        },
    ]
}

/// Memory store with switchable faults. `interleave` yields before every
/// call so joined futures alternate; `fail_promotion` writes the new version
/// and then fails before the prior is retired; `stall_promotion` sleeps past
/// any reasonable deadline; `fail_updates_in` rejects bulk updates against
/// one named partition; `fail_consent_writes` rejects inserts into the
/// consents collection.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pub interleave: Arc<AtomicBool>,
    pub fail_promotion: Arc<AtomicBool>,
    pub stall_promotion: Arc<AtomicBool>,
    pub fail_updates_in: Arc<Mutex<Option<String>>>,
    pub fail_consent_writes: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_updates_for(&self, partition: &Partition) {
        if let Ok(mut target) = self.fail_updates_in.lock() {
            *target = Some(partition.name().to_string());
        }
    }

    fn updates_fail_in(&self, partition: &Partition) -> bool {
        self.fail_updates_in
            .lock()
            .map(|target| target.as_deref() == Some(partition.name()))
            .unwrap_or(false)
    }

    async fn pause(&self) {
        if self.interleave.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn partition_exists(&self, name: &str) -> Result<bool, StorageError> {
        self.inner.partition_exists(name).await
    }

    async fn list_partitions(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.list_partitions(prefix).await
    }

    async fn create_partition(&self, name: &str) -> Result<(), StorageError> {
        self.inner.create_partition(name).await
    }

    async fn insert(&self, partition: &Partition, collection: Collection, document: Document) -> Result<(), StorageError> {
        self.pause().await;
        if collection == Collection::Consents && self.fail_consent_writes.load(Ordering::SeqCst) {
            return Err(StorageError::QueryError("write rejected".into()));
        }
        self.inner.insert(partition, collection, document).await
    }

    async fn find(&self, partition: &Partition, collection: Collection, filter: FilterData) -> Result<Vec<Document>, StorageError> {
        self.pause().await;
        self.inner.find(partition, collection, filter).await
    }

    async fn count(&self, partition: &Partition, collection: Collection, where_clause: Value) -> Result<u64, StorageError> {
        self.pause().await;
        self.inner.count(partition, collection, where_clause).await
    }

    async fn update_many(
        &self,
        partition: &Partition,
        collection: Collection,
        where_clause: Value,
        set: Document,
    ) -> Result<u64, StorageError> {
        self.pause().await;
        if self.updates_fail_in(partition) {
            return Err(StorageError::QueryError("partition unavailable".into()));
        }
        self.inner.update_many(partition, collection, where_clause, set).await
    }

    async fn promote_version(
        &self,
        partition: &Partition,
        collection: Collection,
        new_version: Document,
        prior_document_id: &str,
        prior_patch: Document,
    ) -> Result<(), StorageError> {
        self.pause().await;
        if self.stall_promotion.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        if self.fail_promotion.load(Ordering::SeqCst) {
            self.inner.insert(partition, collection, new_version).await?;
            return Err(StorageError::QueryError("connection reset".into()));
        }
        self.inner
            .promote_version(partition, collection, new_version, prior_document_id, prior_patch)
            .await
    }
}
