use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::filter::{FilterData, FilterError};
use crate::tenancy::Partition;

/// A stored document: one JSON object
pub type Document = Map<String, Value>;

/// Primary key field of every document
pub const ID_FIELD: &str = "documentId";

/// Logical document kinds. Each maps to one collection (table) per partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    ConsentTemplates,
    Consents,
    ConsentHandles,
    BusinessApplications,
    SigningKeys,
}

impl Collection {
    pub const ALL: [Collection; 5] = [
        Collection::ConsentTemplates,
        Collection::Consents,
        Collection::ConsentHandles,
        Collection::BusinessApplications,
        Collection::SigningKeys,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::ConsentTemplates => "consent_templates",
            Collection::Consents => "consents",
            Collection::ConsentHandles => "cookie_consent_handles",
            Collection::BusinessApplications => "business_applications",
            Collection::SigningKeys => "signing_keys",
        }
    }

    /// Only key material may live outside a tenant partition
    pub fn allows_shared(&self) -> bool {
        matches!(self, Collection::SigningKeys)
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from document stores
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid partition name: {0}")]
    InvalidPartitionName(String),

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    /// Duplicate document id or duplicate (logicalId, version)
    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Store operation timed out")]
    Timeout,

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Document serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl From<FilterError> for StorageError {
    fn from(err: FilterError) -> Self {
        StorageError::QueryError(err.to_string())
    }
}

/// Minimal document store contract: per-partition collections of JSON
/// documents, simple queries and conditional updates. No cross-document
/// transactions are assumed.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn partition_exists(&self, name: &str) -> Result<bool, StorageError>;

    /// Partition names starting with `prefix`
    async fn list_partitions(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

    async fn create_partition(&self, name: &str) -> Result<(), StorageError>;

    /// Fails with `Conflict` on a duplicate `documentId`, or on a duplicate
    /// `(logicalId, version)` pair when both fields are present.
    async fn insert(&self, partition: &Partition, collection: Collection, document: Document)
        -> Result<(), StorageError>;

    async fn find(&self, partition: &Partition, collection: Collection, filter: FilterData)
        -> Result<Vec<Document>, StorageError>;

    async fn count(&self, partition: &Partition, collection: Collection, where_clause: Value)
        -> Result<u64, StorageError>;

    /// Merge `set` into every document matching `where_clause`; each document
    /// is matched and patched atomically. Returns the number patched.
    async fn update_many(
        &self,
        partition: &Partition,
        collection: Collection,
        where_clause: Value,
        set: Document,
    ) -> Result<u64, StorageError>;

    /// Write `new_version`, then patch the prior document out of ACTIVE.
    ///
    /// The new document is durably written before the prior is touched, so a
    /// failure in between leaves two ACTIVE versions rather than none. Stores
    /// with multi-document transactions override this to do both at once.
    async fn promote_version(
        &self,
        partition: &Partition,
        collection: Collection,
        new_version: Document,
        prior_document_id: &str,
        prior_patch: Document,
    ) -> Result<(), StorageError> {
        self.insert(partition, collection, new_version).await?;
        let flipped = self
            .update_many(partition, collection, prior_active_clause(prior_document_id), prior_patch)
            .await?;
        if flipped == 0 {
            tracing::warn!(
                "Prior version {} in {}/{} was no longer ACTIVE after promotion",
                prior_document_id, partition, collection
            );
            return Err(StorageError::Conflict(prior_document_id.to_string()));
        }
        Ok(())
    }
}

/// Matches the prior version only while it is still the ACTIVE one
pub fn prior_active_clause(prior_document_id: &str) -> Value {
    json!({ ID_FIELD: prior_document_id, "versionStatus": "ACTIVE" })
}

/// Bound a store call by the caller's deadline. On expiry the outcome of the
/// call is unknown.
pub async fn within_deadline<T, F>(deadline: Duration, operation: F) -> Result<T, StorageError>
where
    F: Future<Output = Result<T, StorageError>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout),
    }
}

/// Key used for version-uniqueness conflicts
pub(crate) fn version_key(document: &Document) -> Option<String> {
    let logical_id = document.get("logicalId")?.as_str()?;
    let version = document.get("version")?.as_u64()?;
    Some(format!("{}@v{}", logical_id, version))
}

pub(crate) fn document_id(document: &Document) -> Result<String, StorageError> {
    document
        .get(ID_FIELD)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StorageError::QueryError(format!("Document is missing '{}'", ID_FIELD)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_are_stable() {
        assert_eq!(Collection::ConsentTemplates.name(), "consent_templates");
        assert_eq!(Collection::Consents.name(), "consents");
        assert_eq!(Collection::ConsentHandles.name(), "cookie_consent_handles");
        assert_eq!(Collection::parse("consents"), Some(Collection::Consents));
        assert_eq!(Collection::parse("users"), None);
    }

    #[test]
    fn only_key_material_is_tenant_independent() {
        assert!(Collection::SigningKeys.allows_shared());
        assert!(!Collection::Consents.allows_shared());
        assert!(!Collection::BusinessApplications.allows_shared());
    }

    #[tokio::test]
    async fn deadline_expiry_is_a_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StorageError>(())
        };
        let err = within_deadline(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, StorageError::Timeout));
    }

    #[test]
    fn version_key_requires_both_fields() {
        let doc = json!({ "logicalId": "T1", "version": 2 }).as_object().cloned().unwrap();
        assert_eq!(version_key(&doc).as_deref(), Some("T1@v2"));
        let handle = json!({ "documentId": "h1" }).as_object().cloned().unwrap();
        assert_eq!(version_key(&handle), None);
    }
}
