use chrono::Duration;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::clock::SharedClock;
use crate::database::{within_deadline, Collection, Document, VersionedEntityStore};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::filter::FilterData;
use crate::lifecycle::handle as lifecycle;
use crate::models::{from_document, to_document, ConsentHandle, ConsentTemplate, HandleStatus, TemplateStatus};
use crate::tenancy::{Partition, TenantRouter, TenantScope};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleRequest {
    pub template_id: String,
    pub customer_identifier: String,
}

#[derive(Clone)]
pub struct HandleService {
    router: TenantRouter,
    templates: VersionedEntityStore<ConsentTemplate>,
    clock: SharedClock,
    ttl: Duration,
}

impl HandleService {
    pub fn new(
        router: TenantRouter,
        templates: VersionedEntityStore<ConsentTemplate>,
        clock: SharedClock,
        ttl: Duration,
    ) -> Self {
        Self {
            router,
            templates,
            clock,
            ttl,
        }
    }

    fn partition(&self, scope: &TenantScope) -> CoreResult<Partition> {
        self.router.resolve_for(scope, Collection::ConsentHandles)
    }

    /// Issue a PENDING handle against the active, published template version
    pub async fn create_handle(&self, scope: &TenantScope, request: HandleRequest) -> CoreResult<ConsentHandle> {
        let tenant = scope.tenant_id()?;
        if request.customer_identifier.trim().is_empty() {
            return Err(CoreError::invalid_input("customerIdentifier is required"));
        }
        let template = self.templates.get_active(scope, &request.template_id).await?;
        if template.status != TemplateStatus::Published {
            return Err(CoreError::invalid_input("Template is not published"));
        }

        let now = self.clock.now();
        let handle = ConsentHandle {
            handle_id: Uuid::new_v4().to_string(),
            tenant_id: tenant.as_str().to_string(),
            business_id: template.business_id.clone(),
            template_id: template.meta.logical_id.clone(),
            template_version: template.meta.version,
            customer_identifier: request.customer_identifier,
            status: HandleStatus::Pending,
            created_at: now,
            expires_at: now + self.ttl,
        };

        let partition = self.partition(scope)?;
        let document = to_document(&handle)?;
        within_deadline(
            scope.deadline(),
            self.router.store().insert(&partition, Collection::ConsentHandles, document),
        )
        .await?;
        info!("Issued consent handle {} for template {} v{}", handle.handle_id, handle.template_id, handle.template_version);
        Ok(handle)
    }

    /// Stored handle, without lazy expiry applied
    async fn load(&self, scope: &TenantScope, handle_id: &str) -> CoreResult<ConsentHandle> {
        let tenant = scope.tenant_id()?;
        let partition = self.partition(scope)?;
        let filter = FilterData::where_only(json!({ "documentId": handle_id })).with_limit(1);
        let found = within_deadline(
            scope.deadline(),
            self.router.store().find(&partition, Collection::ConsentHandles, filter),
        )
        .await?;
        let document = found
            .into_iter()
            .next()
            .ok_or_else(|| CoreError::not_found("Consent handle not found"))?;

        let handle: ConsentHandle = from_document(document)?;
        if handle.tenant_id != tenant.as_str() {
            error!(
                "Tenant isolation violation reading handle {}: recorded tenant '{}' but request asserted '{}'",
                handle.handle_id, handle.tenant_id, tenant
            );
            return Err(CoreError::new(
                ErrorKind::TenantIsolationViolation,
                "Record does not belong to the requesting tenant",
            )
            .with_tenant(tenant.as_str()));
        }
        Ok(handle)
    }

    /// Handle as the caller should see it; EXPIRED once past `expiresAt`
    pub async fn get_handle(&self, scope: &TenantScope, handle_id: &str) -> CoreResult<ConsentHandle> {
        let mut handle = self.load(scope, handle_id).await?;
        handle.status = lifecycle::effective_status(&handle, self.clock.now());
        Ok(handle)
    }

    /// PENDING -> USED, exactly once
    pub async fn consume_handle(&self, scope: &TenantScope, handle_id: &str) -> CoreResult<ConsentHandle> {
        self.finish(scope, handle_id, HandleStatus::Used).await
    }

    /// PENDING -> REJECTED
    pub async fn reject_handle(&self, scope: &TenantScope, handle_id: &str) -> CoreResult<ConsentHandle> {
        self.finish(scope, handle_id, HandleStatus::Rejected).await
    }

    async fn finish(&self, scope: &TenantScope, handle_id: &str, to: HandleStatus) -> CoreResult<ConsentHandle> {
        let now = self.clock.now();
        let handle = self.load(scope, handle_id).await?;
        lifecycle::ensure_consumable(&handle, now)?;

        // Only one caller can match the PENDING, unexpired document
        let partition = self.partition(scope)?;
        let condition = json!({
            "documentId": handle_id,
            "status": HandleStatus::Pending.as_str(),
            "expiresAt": { "$gt": now.timestamp_millis() }
        });
        let mut set = Document::new();
        set.insert("status".into(), json!(to.as_str()));
        let updated = within_deadline(
            scope.deadline(),
            self.router.store().update_many(&partition, Collection::ConsentHandles, condition, set),
        )
        .await?;

        if updated == 0 {
            let current = self.load(scope, handle_id).await?;
            lifecycle::ensure_consumable(&current, now)?;
            return Err(CoreError::new(ErrorKind::HandleAlreadyUsed, "Consent handle has already been used"));
        }

        info!("Consent handle {} marked {}", handle_id, to.as_str());
        Ok(ConsentHandle { status: to, ..handle })
    }
}
