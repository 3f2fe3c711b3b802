use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::clock::SharedClock;
use crate::database::{Document, VersionedEntityStore};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::lifecycle::consent as lifecycle;
use crate::models::{Consent, ConsentStatus, ConsentTemplate, PreferenceStatus, VersionMeta};
use crate::services::handle_service::HandleService;
use crate::tenancy::TenantScope;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentRequest {
    pub handle_id: String,
    pub preferences: Vec<PreferenceStatus>,
}

#[derive(Clone)]
pub struct ConsentService {
    consents: VersionedEntityStore<Consent>,
    templates: VersionedEntityStore<ConsentTemplate>,
    handles: HandleService,
    clock: SharedClock,
}

impl ConsentService {
    pub fn new(
        consents: VersionedEntityStore<Consent>,
        templates: VersionedEntityStore<ConsentTemplate>,
        handles: HandleService,
        clock: SharedClock,
    ) -> Self {
        Self {
            consents,
            templates,
            handles,
            clock,
        }
    }

    pub fn store(&self) -> &VersionedEntityStore<Consent> {
        &self.consents
    }

    /// Create version 1 of a consent. The handle is consumed before anything
    /// is written, so a handle gates at most one consent.
    pub async fn create_from_handle(&self, scope: &TenantScope, request: ConsentRequest) -> CoreResult<Consent> {
        let handle = self.handles.get_handle(scope, &request.handle_id).await?;
        let template = self
            .templates
            .get_by_version(scope, &handle.template_id, handle.template_version)
            .await?;
        validate_choices(&template, &request.preferences)?;
        let now = self.clock.now();
        let end_date = consent_end_date(&template, now)?;

        let handle = self.handles.consume_handle(scope, &request.handle_id).await?;

        let consent = Consent {
            meta: VersionMeta::unassigned(),
            business_id: handle.business_id,
            template_id: handle.template_id,
            template_version: handle.template_version,
            customer_identifier: handle.customer_identifier,
            handle_id: handle.handle_id,
            status: lifecycle::derive_status(&request.preferences),
            preferences: request.preferences,
            start_date: now,
            end_date,
        };
        let handle_id = request.handle_id;
        let created = match self.consents.create_first_version(scope, consent).await {
            Ok(created) => created,
            Err(err) => {
                // The handle stays USED; operators must issue a new one
                warn!(
                    "Handle {} consumed but consent write failed ({}): {}",
                    handle_id,
                    err.kind().code(),
                    err
                );
                return Err(err);
            }
        };
        info!(
            "Consent {} created from handle {} with status {}",
            created.meta.logical_id,
            created.handle_id,
            created.status.as_str()
        );
        Ok(created)
    }

    /// New version with the given choices and a re-derived status
    pub async fn update_preferences(
        &self,
        scope: &TenantScope,
        logical_id: &str,
        preferences: Vec<PreferenceStatus>,
    ) -> CoreResult<Consent> {
        let current = self.consents.get_active(scope, logical_id).await?;
        lifecycle::ensure_mutable(current.status)?;
        let template = self
            .templates
            .get_by_version(scope, &current.template_id, current.template_version)
            .await?;
        validate_choices(&template, &preferences)?;

        self.consents
            .create_next_version(scope, logical_id, move |consent| {
                lifecycle::ensure_mutable(consent.status)?;
                consent.status = lifecycle::derive_status(&preferences);
                consent.preferences = preferences;
                Ok(())
            })
            .await
    }

    /// User-driven status change; only revocation is accepted. Applied to the
    /// active version in place so revocation is never throttled.
    pub async fn update_status(&self, scope: &TenantScope, logical_id: &str, to: ConsentStatus) -> CoreResult<Consent> {
        let current = self.consents.get_active(scope, logical_id).await?;
        lifecycle::user_transition(current.status, to)?;

        let mut set = Document::new();
        set.insert("status".into(), json!(to.as_str()));
        let condition = json!({ "status": current.status.as_str() });
        match self.consents.patch_active(scope, logical_id, condition, set).await? {
            Some(updated) => {
                info!("Consent {} moved to {}", logical_id, to.as_str());
                Ok(updated)
            }
            None => Err(CoreError::new(
                ErrorKind::ConcurrentVersionCreation,
                "Consent changed while its status was being updated; retry",
            )
            .with_logical_id(logical_id)),
        }
    }

    pub async fn get_active(&self, scope: &TenantScope, logical_id: &str) -> CoreResult<Consent> {
        self.consents.get_active(scope, logical_id).await
    }

    pub async fn get_version(&self, scope: &TenantScope, logical_id: &str, version: u32) -> CoreResult<Consent> {
        self.consents.get_by_version(scope, logical_id, version).await
    }

    pub async fn history(&self, scope: &TenantScope, logical_id: &str) -> CoreResult<Vec<Consent>> {
        self.consents.list_history(scope, logical_id).await
    }
}

/// Consent validity runs to the longest validity of any template purpose
fn consent_end_date(template: &ConsentTemplate, now: DateTime<Utc>) -> CoreResult<DateTime<Utc>> {
    let days = i64::from(template.longest_validity_days());
    Duration::try_days(days)
        .and_then(|validity| now.checked_add_signed(validity))
        .ok_or_else(|| CoreError::invalid_input(format!("Validity of {} days is out of range", days)))
}

/// Every choice must name a purpose of the template, at most once
fn validate_choices(template: &ConsentTemplate, choices: &[PreferenceStatus]) -> CoreResult<()> {
    let known: HashSet<&str> = template.preferences.iter().map(|p| p.purpose_id.as_str()).collect();
    let mut seen = HashSet::new();
    for choice in choices {
        if !known.contains(choice.purpose_id.as_str()) {
            return Err(CoreError::invalid_input(format!(
                "Unknown preference purposeId '{}'",
                choice.purpose_id
            )));
        }
        if !seen.insert(choice.purpose_id.as_str()) {
            return Err(CoreError::invalid_input(format!(
                "Duplicate preference purposeId '{}'",
                choice.purpose_id
            )));
        }
    }
    Ok(())
}
