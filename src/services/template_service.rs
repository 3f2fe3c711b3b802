use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::database::{BusinessDirectory, Document, VersionedEntityStore};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::lifecycle::template as lifecycle;
use crate::models::{ConsentTemplate, LocalizedContent, PreferenceDefinition, TemplateStatus, VersionMeta};
use crate::tenancy::TenantScope;

/// Input for a new template
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDraft {
    pub business_id: String,
    pub name: String,
    #[serde(default)]
    pub preferences: Vec<PreferenceDefinition>,
    #[serde(default)]
    pub content: BTreeMap<String, LocalizedContent>,
    #[serde(default)]
    pub ui_config: Value,
}

/// Changes applied when deriving a new template version. Absent fields are
/// carried over.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateChanges {
    pub business_id: Option<String>,
    pub name: Option<String>,
    pub preferences: Option<Vec<PreferenceDefinition>>,
    pub content: Option<BTreeMap<String, LocalizedContent>>,
    pub ui_config: Option<Value>,
}

#[derive(Clone)]
pub struct TemplateService {
    templates: VersionedEntityStore<ConsentTemplate>,
    directory: Arc<dyn BusinessDirectory>,
}

impl TemplateService {
    pub fn new(templates: VersionedEntityStore<ConsentTemplate>, directory: Arc<dyn BusinessDirectory>) -> Self {
        Self { templates, directory }
    }

    pub fn store(&self) -> &VersionedEntityStore<ConsentTemplate> {
        &self.templates
    }

    pub async fn create_template(&self, scope: &TenantScope, draft: TemplateDraft) -> CoreResult<ConsentTemplate> {
        if draft.name.trim().is_empty() {
            return Err(CoreError::invalid_input("Template name is required"));
        }
        validate_preferences(&draft.preferences)?;
        if !self.directory.business_exists(scope, &draft.business_id).await? {
            return Err(CoreError::invalid_input("Unknown business"));
        }

        let template = ConsentTemplate {
            meta: VersionMeta::unassigned(),
            business_id: draft.business_id,
            name: draft.name,
            status: TemplateStatus::Draft,
            preferences: draft.preferences,
            content: draft.content,
            ui_config: draft.ui_config,
        };
        self.templates.create_first_version(scope, template).await
    }

    /// New version from the active one; the new version starts as DRAFT
    pub async fn update_template(
        &self,
        scope: &TenantScope,
        logical_id: &str,
        changes: TemplateChanges,
    ) -> CoreResult<ConsentTemplate> {
        if let Some(ref preferences) = changes.preferences {
            validate_preferences(preferences)?;
        }
        self.templates
            .create_next_version(scope, logical_id, move |template| {
                template.status = lifecycle::status_for_new_version(template.status)?;
                if let Some(business_id) = changes.business_id {
                    template.business_id = business_id;
                }
                if let Some(name) = changes.name {
                    template.name = name;
                }
                if let Some(preferences) = changes.preferences {
                    template.preferences = preferences;
                }
                if let Some(content) = changes.content {
                    template.content = content;
                }
                if let Some(ui_config) = changes.ui_config {
                    template.ui_config = ui_config;
                }
                Ok(())
            })
            .await
    }

    pub async fn publish_template(&self, scope: &TenantScope, logical_id: &str) -> CoreResult<ConsentTemplate> {
        self.move_to(scope, logical_id, TemplateStatus::Published).await
    }

    pub async fn archive_template(&self, scope: &TenantScope, logical_id: &str) -> CoreResult<ConsentTemplate> {
        self.move_to(scope, logical_id, TemplateStatus::Archived).await
    }

    /// In-place status change of the active version, conditional on the
    /// status it was read with
    async fn move_to(&self, scope: &TenantScope, logical_id: &str, to: TemplateStatus) -> CoreResult<ConsentTemplate> {
        let current = self.templates.get_active(scope, logical_id).await?;
        lifecycle::transition(current.status, to)?;

        let mut set = Document::new();
        set.insert("status".into(), json!(to.as_str()));
        let condition = json!({ "status": current.status.as_str() });
        match self.templates.patch_active(scope, logical_id, condition, set).await? {
            Some(updated) => {
                info!("Template {} v{} moved to {}", logical_id, updated.meta.version, to.as_str());
                Ok(updated)
            }
            None => Err(CoreError::new(
                ErrorKind::ConcurrentVersionCreation,
                "Template changed while its status was being updated; retry",
            )
            .with_logical_id(logical_id)),
        }
    }

    pub async fn get_active(&self, scope: &TenantScope, logical_id: &str) -> CoreResult<ConsentTemplate> {
        self.templates.get_active(scope, logical_id).await
    }

    pub async fn get_version(&self, scope: &TenantScope, logical_id: &str, version: u32) -> CoreResult<ConsentTemplate> {
        self.templates.get_by_version(scope, logical_id, version).await
    }

    pub async fn history(&self, scope: &TenantScope, logical_id: &str) -> CoreResult<Vec<ConsentTemplate>> {
        self.templates.list_history(scope, logical_id).await
    }
}

/// Upper bound on a purpose's validity, roughly a century
pub const MAX_VALIDITY_DAYS: u32 = 36_500;

fn validate_preferences(preferences: &[PreferenceDefinition]) -> CoreResult<()> {
    let mut seen = std::collections::HashSet::new();
    for preference in preferences {
        if preference.purpose_id.trim().is_empty() {
            return Err(CoreError::invalid_input("Preference purposeId is required"));
        }
        if !(1..=MAX_VALIDITY_DAYS).contains(&preference.validity_days) {
            return Err(CoreError::invalid_input(format!(
                "validityDays of '{}' must be between 1 and {}",
                preference.purpose_id, MAX_VALIDITY_DAYS
            )));
        }
        if !seen.insert(preference.purpose_id.as_str()) {
            return Err(CoreError::invalid_input(format!(
                "Duplicate preference purposeId '{}'",
                preference.purpose_id
            )));
        }
    }
    Ok(())
}
