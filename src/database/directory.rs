use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::database::store::{within_deadline, Collection, DocumentStore};
use crate::error::CoreResult;
use crate::tenancy::{TenantRouter, TenantScope};

/// Read-only existence predicate for business associations
#[async_trait]
pub trait BusinessDirectory: Send + Sync {
    async fn business_exists(&self, scope: &TenantScope, business_id: &str) -> CoreResult<bool>;
}

/// Looks businesses up in the tenant's `business_applications` collection
pub struct StoreBusinessDirectory {
    router: TenantRouter,
}

impl StoreBusinessDirectory {
    pub fn new(router: TenantRouter) -> Self {
        Self { router }
    }
}

#[async_trait]
impl BusinessDirectory for StoreBusinessDirectory {
    async fn business_exists(&self, scope: &TenantScope, business_id: &str) -> CoreResult<bool> {
        let partition = self.router.resolve_for(scope, Collection::BusinessApplications)?;
        let store: &Arc<dyn DocumentStore> = self.router.store();
        let found = within_deadline(
            scope.deadline(),
            store.count(&partition, Collection::BusinessApplications, json!({ "businessId": business_id })),
        )
        .await?;
        Ok(found > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TenancyConfig;
    use crate::database::MemoryStore;
    use crate::tenancy::{with_tenant, TenantId};
    use std::time::Duration;

    #[tokio::test]
    async fn finds_registered_businesses_only_in_own_partition() {
        let router = TenantRouter::new(Arc::new(MemoryStore::new()), &TenancyConfig::default());
        let acme = TenantId::parse("acme").unwrap();
        let globex = TenantId::parse("globex").unwrap();
        let acme_partition = router.provision(&acme).await.unwrap();
        router.provision(&globex).await.unwrap();
        router
            .store()
            .insert(
                &acme_partition,
                Collection::BusinessApplications,
                json!({ "documentId": "b1", "businessId": "biz-1" }).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();

        let directory = Arc::new(StoreBusinessDirectory::new(router));
        let d = directory.clone();
        let in_acme = with_tenant(acme, Duration::from_secs(1), |scope| async move {
            d.business_exists(&scope, "biz-1").await.unwrap()
        })
        .await;
        let in_globex = with_tenant(globex, Duration::from_secs(1), |scope| async move {
            directory.business_exists(&scope, "biz-1").await.unwrap()
        })
        .await;
        assert!(in_acme);
        assert!(!in_globex);
    }
}
