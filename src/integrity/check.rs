use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::config::VersionPolicy;
use crate::database::{Collection, Document, DocumentStore};
use crate::error::{CoreError, ErrorKind};
use crate::tenancy::{Partition, TenantId};

/// When a check runs relative to a version-mutating write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CheckPhase {
    /// Before `create_next_version` writes anything
    PreFlight,
    /// After the new version has been promoted
    PostWrite,
    /// Out-of-band scan; violations are reported, never raised
    Audit,
}

/// Everything a check needs to inspect one logical entity
pub struct CheckContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub partition: &'a Partition,
    pub collection: Collection,
    pub logical_id: &'a str,
    /// Tenant asserted by the caller
    pub tenant: &'a TenantId,
    /// Current ACTIVE document when the caller already has it
    pub subject: Option<&'a Document>,
    /// Throttling policy; absent during audits
    pub policy: Option<&'a VersionPolicy>,
    pub now: DateTime<Utc>,
    pub deadline: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Warning,
    Violation,
}

/// Operator-facing result of a check
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub check: &'static str,
    pub logical_id: String,
    pub severity: Severity,
    pub kind: Option<ErrorKind>,
    pub message: String,
    pub document_ids: Vec<String>,
}

impl Finding {
    pub fn warning(check: &'static str, logical_id: &str, message: impl Into<String>) -> Self {
        Self {
            check,
            logical_id: logical_id.to_string(),
            severity: Severity::Warning,
            kind: None,
            message: message.into(),
            document_ids: Vec::new(),
        }
    }

    pub fn violation(check: &'static str, logical_id: &str, err: &CoreError) -> Self {
        Self {
            check,
            logical_id: logical_id.to_string(),
            severity: Severity::Violation,
            kind: Some(err.kind()),
            message: err.message.clone(),
            document_ids: err.context.document_ids.clone(),
        }
    }
}

/// One invariant check in the validator pipeline. A returned error aborts
/// the operation; findings are advisory.
#[async_trait]
pub trait IntegrityCheck: Send + Sync {
    fn name(&self) -> &'static str;

    /// Position in the pipeline (lower runs first)
    fn order(&self) -> u8;

    fn applies_to(&self, phase: CheckPhase) -> bool;

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CoreError>;
}

pub(crate) fn str_field<'d>(document: &'d Document, field: &str) -> &'d str {
    document.get(field).and_then(Value::as_str).unwrap_or("")
}

pub(crate) fn version_of(document: &Document) -> u32 {
    document.get("version").and_then(Value::as_u64).unwrap_or(0) as u32
}

pub(crate) fn created_at_of(document: &Document) -> Option<DateTime<Utc>> {
    document
        .get("createdAt")
        .and_then(Value::as_i64)
        .and_then(DateTime::from_timestamp_millis)
}
