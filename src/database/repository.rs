use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::config::{IntegrityConfig, VersionPolicy};
use crate::database::store::{within_deadline, Document, DocumentStore, StorageError};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::filter::FilterData;
use crate::integrity::{CheckContext, Finding, IntegrityValidator};
use crate::models::{from_document, to_document, VersionMeta, VersionStatus, Versioned};
use crate::tenancy::{Partition, TenantRouter, TenantScope};

/// Version-chain storage for one kind of logical entity
pub struct VersionedEntityStore<T> {
    router: TenantRouter,
    validator: Arc<IntegrityValidator>,
    clock: SharedClock,
    policy: VersionPolicy,
    _phantom: PhantomData<fn() -> T>,
}

impl<T> Clone for VersionedEntityStore<T> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            validator: self.validator.clone(),
            clock: self.clock.clone(),
            policy: self.policy.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<T: Versioned> VersionedEntityStore<T> {
    pub fn new(
        router: TenantRouter,
        validator: Arc<IntegrityValidator>,
        clock: SharedClock,
        integrity: &IntegrityConfig,
    ) -> Self {
        Self {
            router,
            validator,
            clock,
            policy: T::policy(integrity).clone(),
            _phantom: PhantomData,
        }
    }

    pub fn policy(&self) -> &VersionPolicy {
        &self.policy
    }

    fn store(&self) -> &dyn DocumentStore {
        self.router.store().as_ref()
    }

    fn partition(&self, scope: &TenantScope) -> CoreResult<Partition> {
        self.router.resolve_for(scope, T::COLLECTION)
    }

    async fn find(&self, scope: &TenantScope, partition: &Partition, filter: FilterData) -> CoreResult<Vec<Document>> {
        Ok(within_deadline(scope.deadline(), self.store().find(partition, T::COLLECTION, filter)).await?)
    }

    async fn active_documents(
        &self,
        scope: &TenantScope,
        partition: &Partition,
        logical_id: &str,
    ) -> CoreResult<Vec<Document>> {
        let filter = FilterData::where_only(json!({ "logicalId": logical_id, "versionStatus": "ACTIVE" }))
            .with_order(json!("version desc"));
        self.find(scope, partition, filter).await
    }

    /// Decode a stored version, refusing documents recorded for another tenant
    fn decode(&self, scope: &TenantScope, document: Document) -> CoreResult<T> {
        let tenant = scope.tenant_id()?;
        let entity: T = from_document(document)?;
        if entity.meta().tenant_id != tenant.as_str() {
            error!(
                "Tenant isolation violation reading {} {}: recorded tenant '{}' but request asserted '{}'",
                T::LABEL,
                entity.meta().document_id,
                entity.meta().tenant_id,
                tenant
            );
            return Err(CoreError::new(
                ErrorKind::TenantIsolationViolation,
                "Record does not belong to the requesting tenant",
            )
            .with_logical_id(entity.meta().logical_id.clone())
            .with_tenant(tenant.as_str()));
        }
        Ok(entity)
    }

    fn not_found(logical_id: &str) -> CoreError {
        CoreError::not_found(format!("{} not found", T::LABEL)).with_logical_id(logical_id)
    }

    pub async fn get_active(&self, scope: &TenantScope, logical_id: &str) -> CoreResult<T> {
        let partition = self.partition(scope)?;
        let mut active = self.active_documents(scope, &partition, logical_id).await?;
        match active.len() {
            0 => {
                let versions = within_deadline(
                    scope.deadline(),
                    self.store().count(&partition, T::COLLECTION, json!({ "logicalId": logical_id })),
                )
                .await?;
                if versions == 0 {
                    return Err(Self::not_found(logical_id));
                }
                error!(
                    "{} {} in {} has {} version(s) but none is active",
                    T::LABEL,
                    logical_id,
                    partition,
                    versions
                );
                Err(CoreError::new(ErrorKind::NoActiveVersion, "Version state is corrupted: no active version")
                    .with_logical_id(logical_id)
                    .with_count(0))
            }
            1 => self.decode(scope, active.remove(0)),
            n => {
                let ids: Vec<String> = active
                    .iter()
                    .filter_map(|d| d.get("documentId").and_then(Value::as_str).map(str::to_string))
                    .collect();
                error!("{} active versions of {} {} in {}: {:?}", n, T::LABEL, logical_id, partition, ids);
                Err(CoreError::new(
                    ErrorKind::MultipleActiveVersions,
                    "Version state is corrupted: more than one active version",
                )
                .with_logical_id(logical_id)
                .with_documents(ids, Vec::new())
                .with_count(n as u64))
            }
        }
    }

    pub async fn get_by_version(&self, scope: &TenantScope, logical_id: &str, version: u32) -> CoreResult<T> {
        let partition = self.partition(scope)?;
        let filter = FilterData::where_only(json!({ "logicalId": logical_id, "version": version })).with_limit(1);
        match self.find(scope, &partition, filter).await?.into_iter().next() {
            Some(document) => self.decode(scope, document),
            None => Err(Self::not_found(logical_id)),
        }
    }

    /// All versions, newest first
    pub async fn list_history(&self, scope: &TenantScope, logical_id: &str) -> CoreResult<Vec<T>> {
        let partition = self.partition(scope)?;
        let filter = FilterData::where_only(json!({ "logicalId": logical_id })).with_order(json!("version desc"));
        let documents = self.find(scope, &partition, filter).await?;
        if documents.is_empty() {
            return Err(Self::not_found(logical_id));
        }
        documents.into_iter().map(|d| self.decode(scope, d)).collect()
    }

    /// Store `entity` as version 1 of a fresh logical id
    pub async fn create_first_version(&self, scope: &TenantScope, mut entity: T) -> CoreResult<T> {
        let tenant = scope.tenant_id()?;
        let partition = self.partition(scope)?;
        *entity.meta_mut() = VersionMeta::first(tenant, self.clock.now());

        let document = to_document(&entity)?;
        within_deadline(scope.deadline(), self.store().insert(&partition, T::COLLECTION, document)).await?;
        info!("Created {} {} v1 in {}", T::LABEL, entity.meta().logical_id, partition);
        Ok(entity)
    }

    /// Derive a new ACTIVE version from the current one.
    ///
    /// The new document is written before the prior is retired. If the store
    /// cannot do both atomically, a failure in between leaves two ACTIVE
    /// versions, which the integrity checks surface.
    pub async fn create_next_version<F>(&self, scope: &TenantScope, logical_id: &str, mutator: F) -> CoreResult<T>
    where
        F: FnOnce(&mut T) -> CoreResult<()>,
    {
        let tenant = scope.tenant_id()?;
        let partition = self.partition(scope)?;
        let now = self.clock.now();

        let existing = within_deadline(
            scope.deadline(),
            self.store().count(&partition, T::COLLECTION, json!({ "logicalId": logical_id })),
        )
        .await?;
        if existing == 0 {
            return Err(Self::not_found(logical_id));
        }

        let active = self.active_documents(scope, &partition, logical_id).await?;
        let subject = if active.len() == 1 { active.first() } else { None };
        let ctx = CheckContext {
            store: self.store(),
            partition: &partition,
            collection: T::COLLECTION,
            logical_id,
            tenant,
            subject,
            policy: Some(&self.policy),
            now,
            deadline: scope.deadline(),
        };
        self.validator.preflight(&ctx).await?;

        // Preflight guarantees exactly one active document
        let prior_document = subject
            .cloned()
            .ok_or_else(|| CoreError::new(ErrorKind::NoActiveVersion, "No active version").with_logical_id(logical_id))?;
        let prior: T = from_document(prior_document.clone())?;

        let mut draft = prior.clone();
        mutator(&mut draft)?;
        check_immutable_fields::<T>(&prior_document, &to_document(&draft)?)?;

        *draft.meta_mut() = prior.meta().next(now);
        let new_document = to_document(&draft)?;
        let mut prior_patch = Document::new();
        prior_patch.insert("versionStatus".into(), json!(VersionStatus::Updated.as_str()));
        prior_patch.insert("updatedAt".into(), json!(now.timestamp_millis()));

        let promoted = within_deadline(
            scope.deadline(),
            self.store().promote_version(
                &partition,
                T::COLLECTION,
                new_document.clone(),
                &prior.meta().document_id,
                prior_patch,
            ),
        )
        .await;
        if let Err(err) = promoted {
            if matches!(err, StorageError::Timeout) {
                warn!(
                    "Timed out promoting {} {} to v{}; outcome unknown, verify before retrying",
                    T::LABEL,
                    logical_id,
                    draft.meta().version
                );
            }
            return Err(CoreError::from(err).with_logical_id(logical_id));
        }

        let post_ctx = CheckContext {
            store: self.store(),
            partition: &partition,
            collection: T::COLLECTION,
            logical_id,
            tenant,
            subject: Some(&new_document),
            policy: None,
            now,
            deadline: scope.deadline(),
        };
        self.validator.post_write(&post_ctx).await?;

        info!(
            "Created {} {} v{} in {} (v{} retired)",
            T::LABEL,
            logical_id,
            draft.meta().version,
            partition,
            prior.meta().version
        );
        Ok(draft)
    }

    /// Patch the ACTIVE version in place when it still matches `condition`.
    /// Returns the refreshed entity, or `None` when nothing matched.
    pub async fn patch_active(
        &self,
        scope: &TenantScope,
        logical_id: &str,
        condition: Value,
        mut set: Document,
    ) -> CoreResult<Option<T>> {
        let partition = self.partition(scope)?;
        let mut clauses = vec![json!({ "logicalId": logical_id, "versionStatus": "ACTIVE" })];
        if !condition.is_null() {
            clauses.push(condition);
        }
        set.insert("updatedAt".into(), json!(self.clock.now().timestamp_millis()));

        let patched = within_deadline(
            scope.deadline(),
            self.store().update_many(&partition, T::COLLECTION, json!({ "$and": clauses }), set),
        )
        .await?;
        if patched == 0 {
            debug!("Conditional patch of {} {} matched nothing", T::LABEL, logical_id);
            return Ok(None);
        }
        self.get_active(scope, logical_id).await.map(Some)
    }

    /// Re-run the preflight checks, e.g. after a timed-out write
    pub async fn verify(&self, scope: &TenantScope, logical_id: &str) -> CoreResult<Vec<Finding>> {
        let tenant = scope.tenant_id()?;
        let partition = self.partition(scope)?;
        let active = self.active_documents(scope, &partition, logical_id).await?;
        let ctx = CheckContext {
            store: self.store(),
            partition: &partition,
            collection: T::COLLECTION,
            logical_id,
            tenant,
            subject: if active.len() == 1 { active.first() } else { None },
            policy: Some(&self.policy),
            now: self.clock.now(),
            deadline: scope.deadline(),
        };
        self.validator.preflight(&ctx).await
    }
}

fn check_immutable_fields<T: Versioned>(prior: &Document, draft: &Document) -> CoreResult<()> {
    for field in T::immutable_fields() {
        if prior.get(*field) != draft.get(*field) {
            warn!("Rejected change to immutable field '{}' of {}", field, T::LABEL);
            return Err(CoreError::new(
                ErrorKind::ImmutableFieldViolation,
                format!("Field '{}' cannot be changed after creation", field),
            ));
        }
    }
    Ok(())
}
