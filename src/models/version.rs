use chrono::serde::ts_milliseconds;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{IntegrityConfig, VersionPolicy};
use crate::database::Collection;
use crate::tenancy::TenantId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VersionStatus {
    Active,
    /// Superseded by a later version
    Updated,
}

impl VersionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionStatus::Active => "ACTIVE",
            VersionStatus::Updated => "UPDATED",
        }
    }
}

/// Bookkeeping shared by every physical version of a logical entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMeta {
    pub logical_id: String,
    pub document_id: String,
    pub version: u32,
    pub version_status: VersionStatus,
    pub tenant_id: String,
    #[serde(with = "ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

impl VersionMeta {
    /// Placeholder for an entity not yet stored; the store assigns real values
    pub fn unassigned() -> Self {
        Self {
            logical_id: String::new(),
            document_id: String::new(),
            version: 0,
            version_status: VersionStatus::Active,
            tenant_id: String::new(),
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    /// Version 1 of a fresh logical entity
    pub fn first(tenant: &TenantId, now: DateTime<Utc>) -> Self {
        Self {
            logical_id: Uuid::new_v4().to_string(),
            document_id: Uuid::new_v4().to_string(),
            version: 1,
            version_status: VersionStatus::Active,
            tenant_id: tenant.as_str().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Successor of this version; logical id and tenant carry over
    pub fn next(&self, now: DateTime<Utc>) -> Self {
        Self {
            logical_id: self.logical_id.clone(),
            document_id: Uuid::new_v4().to_string(),
            version: self.version + 1,
            version_status: VersionStatus::Active,
            tenant_id: self.tenant_id.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.version_status == VersionStatus::Active
    }
}

/// A logical entity stored as a chain of versions
pub trait Versioned: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    /// Human label used in messages
    const LABEL: &'static str;

    fn meta(&self) -> &VersionMeta;

    fn meta_mut(&mut self) -> &mut VersionMeta;

    /// Document fields fixed at version 1 and copied verbatim afterwards
    fn immutable_fields() -> &'static [&'static str];

    fn policy(config: &IntegrityConfig) -> &VersionPolicy;
}
