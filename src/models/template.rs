use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{IntegrityConfig, VersionPolicy};
use crate::database::Collection;
use crate::models::version::{VersionMeta, Versioned};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TemplateStatus {
    Draft,
    Published,
    Archived,
}

impl TemplateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateStatus::Draft => "DRAFT",
            TemplateStatus::Published => "PUBLISHED",
            TemplateStatus::Archived => "ARCHIVED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceDefinition {
    pub purpose_id: String,
    pub name: String,
    #[serde(default)]
    pub mandatory: bool,
    /// How long a consent given for this purpose stays valid
    pub validity_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalizedContent {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentTemplate {
    #[serde(flatten)]
    pub meta: VersionMeta,
    pub business_id: String,
    pub name: String,
    pub status: TemplateStatus,
    pub preferences: Vec<PreferenceDefinition>,
    /// Keyed by language code
    #[serde(default)]
    pub content: BTreeMap<String, LocalizedContent>,
    #[serde(default)]
    pub ui_config: Value,
}

impl ConsentTemplate {
    /// Longest validity among the template's preferences, in days
    pub fn longest_validity_days(&self) -> u32 {
        self.preferences.iter().map(|p| p.validity_days).max().unwrap_or(0)
    }
}

impl Versioned for ConsentTemplate {
    const COLLECTION: Collection = Collection::ConsentTemplates;
    const LABEL: &'static str = "Template";

    fn meta(&self) -> &VersionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut VersionMeta {
        &mut self.meta
    }

    fn immutable_fields() -> &'static [&'static str] {
        &["logicalId", "tenantId", "businessId"]
    }

    fn policy(config: &IntegrityConfig) -> &VersionPolicy {
        &config.templates
    }
}
