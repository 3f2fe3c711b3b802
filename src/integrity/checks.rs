use async_trait::async_trait;
use serde_json::json;
use tracing::{error, warn};

use crate::database::{within_deadline, Document};
use crate::error::{CoreError, ErrorKind};
use crate::filter::FilterData;
use crate::integrity::check::{created_at_of, str_field, version_of, CheckContext, CheckPhase, Finding, IntegrityCheck};

async fn all_versions(ctx: &CheckContext<'_>) -> Result<Vec<Document>, CoreError> {
    let filter = FilterData::where_only(json!({ "logicalId": ctx.logical_id })).with_order(json!("version asc"));
    Ok(within_deadline(ctx.deadline, ctx.store.find(ctx.partition, ctx.collection, filter)).await?)
}

async fn count_since(ctx: &CheckContext<'_>, window: chrono::Duration) -> Result<u64, CoreError> {
    let cutoff = (ctx.now - window).timestamp_millis();
    let where_clause = json!({ "logicalId": ctx.logical_id, "createdAt": { "$gte": cutoff } });
    Ok(within_deadline(ctx.deadline, ctx.store.count(ctx.partition, ctx.collection, where_clause)).await?)
}

/// Exactly one ACTIVE version per logical id
pub struct SingleActiveVersion;

#[async_trait]
impl IntegrityCheck for SingleActiveVersion {
    fn name(&self) -> &'static str {
        "single_active_version"
    }

    fn order(&self) -> u8 {
        10
    }

    fn applies_to(&self, _phase: CheckPhase) -> bool {
        true
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CoreError> {
        let filter = FilterData::where_only(json!({ "logicalId": ctx.logical_id, "versionStatus": "ACTIVE" }))
            .with_order(json!("version asc"));
        let active = within_deadline(ctx.deadline, ctx.store.find(ctx.partition, ctx.collection, filter)).await?;

        match active.len() {
            1 => Ok(Vec::new()),
            0 => Err(CoreError::new(
                ErrorKind::NoActiveVersion,
                "Version state is corrupted: no active version",
            )
            .with_logical_id(ctx.logical_id)
            .with_tenant(ctx.tenant.as_str())
            .with_count(0)),
            n => {
                for document in &active {
                    error!(
                        "Multiple active versions in {}/{}: logicalId={} documentId={} version={} createdAt={:?}",
                        ctx.partition,
                        ctx.collection,
                        ctx.logical_id,
                        str_field(document, "documentId"),
                        version_of(document),
                        created_at_of(document)
                    );
                }
                let ids = active.iter().map(|d| str_field(d, "documentId").to_string()).collect();
                let versions = active.iter().map(version_of).collect();
                Err(CoreError::new(
                    ErrorKind::MultipleActiveVersions,
                    "Version state is corrupted: more than one active version",
                )
                .with_logical_id(ctx.logical_id)
                .with_tenant(ctx.tenant.as_str())
                .with_documents(ids, versions)
                .with_count(n as u64))
            }
        }
    }
}

/// Versions run 1, 2, 3, ... without gaps. Gaps are tolerated and reported.
pub struct VersionContiguity;

#[async_trait]
impl IntegrityCheck for VersionContiguity {
    fn name(&self) -> &'static str {
        "version_contiguity"
    }

    fn order(&self) -> u8 {
        20
    }

    fn applies_to(&self, phase: CheckPhase) -> bool {
        matches!(phase, CheckPhase::PreFlight | CheckPhase::Audit)
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CoreError> {
        let versions: Vec<u32> = all_versions(ctx).await?.iter().map(version_of).collect();
        let mut findings = Vec::new();
        for (expected, actual) in (1u32..).zip(versions.iter().copied()) {
            if expected != actual {
                warn!(
                    "Version sequence gap for {} in {}: expected {}, found {} (sequence {:?})",
                    ctx.logical_id, ctx.partition, expected, actual, versions
                );
                findings.push(Finding::warning(
                    self.name(),
                    ctx.logical_id,
                    format!("Expected version {}, found {}", expected, actual),
                ));
                break;
            }
        }
        Ok(findings)
    }
}

/// Rolling-window ceiling on versions per logical id
pub struct UpdateFrequency;

#[async_trait]
impl IntegrityCheck for UpdateFrequency {
    fn name(&self) -> &'static str {
        "update_frequency"
    }

    fn order(&self) -> u8 {
        30
    }

    fn applies_to(&self, phase: CheckPhase) -> bool {
        phase == CheckPhase::PreFlight
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CoreError> {
        let Some(policy) = ctx.policy else {
            return Ok(Vec::new());
        };
        let recent = count_since(ctx, policy.frequency_window()).await?;
        if recent > policy.frequency_ceiling {
            return Err(CoreError::new(
                ErrorKind::UpdateFrequencyExceeded,
                "Too many versions created recently; try again later",
            )
            .with_logical_id(ctx.logical_id)
            .with_count(recent));
        }
        Ok(Vec::new())
    }
}

/// Short-window write count used as a race detector. Advisory only; version
/// uniqueness in the store is what actually separates concurrent writers.
pub struct ConcurrentModification;

#[async_trait]
impl IntegrityCheck for ConcurrentModification {
    fn name(&self) -> &'static str {
        "concurrent_modification"
    }

    fn order(&self) -> u8 {
        40
    }

    fn applies_to(&self, phase: CheckPhase) -> bool {
        phase == CheckPhase::PreFlight
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CoreError> {
        let Some(policy) = ctx.policy else {
            return Ok(Vec::new());
        };
        let recent = count_since(ctx, policy.race_window()).await?;
        if recent > policy.race_ceiling {
            warn!(
                "Probable concurrent modification of {} in {}: {} versions within {}s",
                ctx.logical_id, ctx.partition, recent, policy.race_window_secs
            );
            return Err(CoreError::new(
                ErrorKind::ConcurrentVersionCreation,
                "Concurrent modification detected; retry the update",
            )
            .with_logical_id(ctx.logical_id)
            .with_count(recent));
        }
        Ok(Vec::new())
    }
}

/// Recorded tenant must match the asserted one
pub struct TenantIsolation;

impl TenantIsolation {
    fn violation(ctx: &CheckContext<'_>, document: &Document) -> CoreError {
        let recorded = str_field(document, "tenantId");
        error!(
            "Tenant isolation violation in {}/{}: documentId={} recorded tenant '{}' but request asserted '{}'",
            ctx.partition,
            ctx.collection,
            str_field(document, "documentId"),
            recorded,
            ctx.tenant
        );
        CoreError::new(ErrorKind::TenantIsolationViolation, "Record does not belong to the requesting tenant")
            .with_logical_id(ctx.logical_id)
            .with_tenant(ctx.tenant.as_str())
            .with_documents(vec![str_field(document, "documentId").to_string()], vec![version_of(document)])
    }
}

#[async_trait]
impl IntegrityCheck for TenantIsolation {
    fn name(&self) -> &'static str {
        "tenant_isolation"
    }

    fn order(&self) -> u8 {
        50
    }

    fn applies_to(&self, _phase: CheckPhase) -> bool {
        true
    }

    async fn run(&self, ctx: &CheckContext<'_>) -> Result<Vec<Finding>, CoreError> {
        let documents = match ctx.subject {
            Some(subject) => vec![subject.clone()],
            None => all_versions(ctx).await?,
        };
        for document in &documents {
            if str_field(document, "tenantId") != ctx.tenant.as_str() {
                return Err(Self::violation(ctx, document));
            }
        }
        Ok(Vec::new())
    }
}
