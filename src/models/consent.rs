use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{IntegrityConfig, VersionPolicy};
use crate::database::Collection;
use crate::models::version::{VersionMeta, Versioned};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferenceChoice {
    #[serde(rename = "ACCEPTED")]
    Accepted,
    #[serde(rename = "NOTACCEPTED")]
    NotAccepted,
    #[serde(rename = "PENDING")]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceStatus {
    pub purpose_id: String,
    pub status: PreferenceChoice,
}

/// Consent lifecycle, distinct from `versionStatus`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentStatus {
    Active,
    Inactive,
    Expired,
    Revoked,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Active => "ACTIVE",
            ConsentStatus::Inactive => "INACTIVE",
            ConsentStatus::Expired => "EXPIRED",
            ConsentStatus::Revoked => "REVOKED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    #[serde(flatten)]
    pub meta: VersionMeta,
    pub business_id: String,
    pub template_id: String,
    pub template_version: u32,
    pub customer_identifier: String,
    /// Handle this consent was created from
    pub handle_id: String,
    pub preferences: Vec<PreferenceStatus>,
    pub status: ConsentStatus,
    #[serde(with = "ts_milliseconds")]
    pub start_date: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub end_date: DateTime<Utc>,
}

impl Versioned for Consent {
    const COLLECTION: Collection = Collection::Consents;
    const LABEL: &'static str = "Consent";

    fn meta(&self) -> &VersionMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut VersionMeta {
        &mut self.meta
    }

    fn immutable_fields() -> &'static [&'static str] {
        &[
            "logicalId",
            "tenantId",
            "businessId",
            "templateId",
            "templateVersion",
            "customerIdentifier",
            "handleId",
        ]
    }

    fn policy(config: &IntegrityConfig) -> &VersionPolicy {
        &config.consents
    }
}
