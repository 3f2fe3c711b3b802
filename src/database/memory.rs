use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::database::store::{
    document_id, prior_active_clause, version_key, Collection, Document, DocumentStore, StorageError, ID_FIELD,
};
use crate::filter::{Filter, FilterData, FilterWhere};
use crate::tenancy::Partition;

type Collections = HashMap<Collection, Vec<Document>>;

/// In-process document store. Each partition holds its own collections; a
/// single lock covers all of them, which makes `promote_version` atomic.
#[derive(Clone, Default)]
pub struct MemoryStore {
    partitions: Arc<RwLock<HashMap<String, Collections>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_unique(existing: &[Document], document: &Document) -> Result<(), StorageError> {
        let id = document_id(document)?;
        if existing.iter().any(|d| d.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str())) {
            return Err(StorageError::Conflict(id));
        }
        if let Some(key) = version_key(document) {
            if existing.iter().any(|d| version_key(d).as_deref() == Some(key.as_str())) {
                return Err(StorageError::Conflict(key));
            }
        }
        Ok(())
    }

    fn patch(documents: &mut [Document], where_clause: &Value, set: &Document) -> Result<u64, StorageError> {
        let mut patched = 0;
        for document in documents.iter_mut() {
            if FilterWhere::matches(document, where_clause)? {
                for (key, value) in set {
                    document.insert(key.clone(), value.clone());
                }
                patched += 1;
            }
        }
        Ok(patched)
    }
}

fn collection_mut<'a>(
    partitions: &'a mut HashMap<String, Collections>,
    partition: &Partition,
    collection: Collection,
) -> Result<&'a mut Vec<Document>, StorageError> {
    let collections = partitions
        .get_mut(partition.name())
        .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
    Ok(collections.entry(collection).or_default())
}

fn collection_ref<'a>(
    partitions: &'a HashMap<String, Collections>,
    partition: &Partition,
    collection: Collection,
) -> Result<&'a [Document], StorageError> {
    let collections = partitions
        .get(partition.name())
        .ok_or_else(|| StorageError::PartitionNotFound(partition.name().to_string()))?;
    Ok(collections.get(&collection).map(Vec::as_slice).unwrap_or(&[]))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn partition_exists(&self, name: &str) -> Result<bool, StorageError> {
        Ok(self.partitions.read().await.contains_key(name))
    }

    async fn list_partitions(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let partitions = self.partitions.read().await;
        let mut names: Vec<String> = partitions.keys().filter(|n| n.starts_with(prefix)).cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_partition(&self, name: &str) -> Result<(), StorageError> {
        self.partitions.write().await.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn insert(&self, partition: &Partition, collection: Collection, document: Document)
        -> Result<(), StorageError>
    {
        let mut partitions = self.partitions.write().await;
        let documents = collection_mut(&mut partitions, partition, collection)?;
        Self::check_unique(documents, &document)?;
        documents.push(document);
        Ok(())
    }

    async fn find(&self, partition: &Partition, collection: Collection, filter_data: FilterData)
        -> Result<Vec<Document>, StorageError>
    {
        let mut filter = Filter::new(collection.name())?;
        filter.assign(filter_data)?;
        let partitions = self.partitions.read().await;
        let documents = collection_ref(&partitions, partition, collection)?;
        Ok(filter.apply(documents.iter().cloned())?)
    }

    async fn count(&self, partition: &Partition, collection: Collection, where_clause: Value)
        -> Result<u64, StorageError>
    {
        let partitions = self.partitions.read().await;
        let documents = collection_ref(&partitions, partition, collection)?;
        let mut count = 0;
        for document in documents {
            if FilterWhere::matches(document, &where_clause)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn update_many(
        &self,
        partition: &Partition,
        collection: Collection,
        where_clause: Value,
        set: Document,
    ) -> Result<u64, StorageError> {
        let mut partitions = self.partitions.write().await;
        let documents = collection_mut(&mut partitions, partition, collection)?;
        Self::patch(documents, &where_clause, &set)
    }

    async fn promote_version(
        &self,
        partition: &Partition,
        collection: Collection,
        new_version: Document,
        prior_document_id: &str,
        prior_patch: Document,
    ) -> Result<(), StorageError> {
        let mut partitions = self.partitions.write().await;
        let documents = collection_mut(&mut partitions, partition, collection)?;

        let prior_clause = prior_active_clause(prior_document_id);
        let mut prior_active = false;
        for document in documents.iter() {
            if FilterWhere::matches(document, &prior_clause)? {
                prior_active = true;
                break;
            }
        }
        if !prior_active {
            return Err(StorageError::Conflict(prior_document_id.to_string()));
        }

        Self::check_unique(documents, &new_version)?;
        documents.push(new_version);
        Self::patch(documents, &prior_clause, &prior_patch)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn store_with(name: &str) -> (MemoryStore, Partition) {
        let store = MemoryStore::new();
        store.create_partition(name).await.unwrap();
        (store, Partition::new(name, false))
    }

    #[tokio::test]
    async fn rejects_duplicate_versions() {
        let (store, p) = store_with("tenant_db_A").await;
        let v1 = doc(json!({ "documentId": "d1", "logicalId": "T1", "version": 1 }));
        store.insert(&p, Collection::ConsentTemplates, v1).await.unwrap();
        let dup = doc(json!({ "documentId": "d2", "logicalId": "T1", "version": 1 }));
        let err = store.insert(&p, Collection::ConsentTemplates, dup).await.unwrap_err();
        assert!(matches!(err, StorageError::Conflict(key) if key == "T1@v1"));
    }

    #[tokio::test]
    async fn missing_partition_is_an_error() {
        let store = MemoryStore::new();
        let p = Partition::new("tenant_db_missing", false);
        let err = store.count(&p, Collection::Consents, json!({})).await.unwrap_err();
        assert!(matches!(err, StorageError::PartitionNotFound(_)));
    }

    #[tokio::test]
    async fn update_many_is_conditional() {
        let (store, p) = store_with("tenant_db_A").await;
        for (id, status) in [("c1", "ACTIVE"), ("c2", "REVOKED")] {
            store
                .insert(&p, Collection::Consents, doc(json!({ "documentId": id, "status": status })))
                .await
                .unwrap();
        }
        let set = doc(json!({ "status": "EXPIRED" }));
        let n = store
            .update_many(&p, Collection::Consents, json!({ "status": "ACTIVE" }), set.clone())
            .await
            .unwrap();
        assert_eq!(n, 1);
        let n = store
            .update_many(&p, Collection::Consents, json!({ "status": "ACTIVE" }), set)
            .await
            .unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn promote_requires_active_prior() {
        let (store, p) = store_with("tenant_db_A").await;
        let v1 = doc(json!({ "documentId": "d1", "logicalId": "T1", "version": 1, "versionStatus": "ACTIVE" }));
        store.insert(&p, Collection::ConsentTemplates, v1).await.unwrap();

        let v2 = doc(json!({ "documentId": "d2", "logicalId": "T1", "version": 2, "versionStatus": "ACTIVE" }));
        let patch = doc(json!({ "versionStatus": "UPDATED" }));
        store
            .promote_version(&p, Collection::ConsentTemplates, v2, "d1", patch.clone())
            .await
            .unwrap();
        let active = store
            .count(&p, Collection::ConsentTemplates, json!({ "versionStatus": "ACTIVE" }))
            .await
            .unwrap();
        assert_eq!(active, 1);

        let stale = doc(json!({ "documentId": "d3", "logicalId": "T1", "version": 3, "versionStatus": "ACTIVE" }));
        let err = store
            .promote_version(&p, Collection::ConsentTemplates, stale, "d1", patch)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict(_)));
        assert_eq!(store.count(&p, Collection::ConsentTemplates, json!({})).await.unwrap(), 2);
    }
}
