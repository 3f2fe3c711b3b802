use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::database::{within_deadline, Collection, Document, DocumentStore};
use crate::error::{CoreError, CoreResult, ErrorKind};
use crate::filter::FilterData;
use crate::integrity::check::{str_field, CheckContext, CheckPhase, Finding, IntegrityCheck, Severity};
use crate::integrity::checks::{
    ConcurrentModification, SingleActiveVersion, TenantIsolation, UpdateFrequency, VersionContiguity,
};
use crate::tenancy::{TenantRouter, TenantScope};

/// Result of an out-of-band audit of one collection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub tenant: String,
    pub collection: String,
    pub logical_ids_checked: usize,
    pub findings: Vec<Finding>,
}

impl AuditReport {
    pub fn violations(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.severity == Severity::Violation)
    }

    pub fn is_clean(&self) -> bool {
        self.violations().next().is_none()
    }

    /// Client-safe copy: document ids dropped and messages replaced with a
    /// fixed text per check. Full detail stays in the logs and the CLI.
    pub fn redacted(mut self) -> Self {
        for finding in &mut self.findings {
            finding.document_ids.clear();
            finding.message = match finding.kind {
                Some(ErrorKind::NoActiveVersion) | Some(ErrorKind::MultipleActiveVersions) => {
                    "Version state is corrupted".to_string()
                }
                Some(ErrorKind::TenantIsolationViolation) => "Record belongs to another tenant".to_string(),
                Some(kind) => format!("Check failed with {}", kind.code()),
                None => format!("{} reported a warning", finding.check),
            };
        }
        self
    }
}

/// Ordered pipeline of integrity checks
pub struct IntegrityValidator {
    checks: Vec<Box<dyn IntegrityCheck>>,
}

impl Default for IntegrityValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrityValidator {
    /// Validator with the standard checks registered
    pub fn new() -> Self {
        let mut validator = Self::empty();
        validator.register(Box::new(SingleActiveVersion));
        validator.register(Box::new(VersionContiguity));
        validator.register(Box::new(UpdateFrequency));
        validator.register(Box::new(ConcurrentModification));
        validator.register(Box::new(TenantIsolation));
        validator
    }

    pub fn empty() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn register(&mut self, check: Box<dyn IntegrityCheck>) {
        debug!("Registered integrity check '{}' at order {}", check.name(), check.order());
        self.checks.push(check);
        self.checks.sort_by_key(|c| c.order());
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    /// Run before a new version is written; the first failing check aborts
    pub async fn preflight(&self, ctx: &CheckContext<'_>) -> CoreResult<Vec<Finding>> {
        self.run_phase(CheckPhase::PreFlight, ctx).await
    }

    /// Run after promotion to catch a second ACTIVE document
    pub async fn post_write(&self, ctx: &CheckContext<'_>) -> CoreResult<Vec<Finding>> {
        self.run_phase(CheckPhase::PostWrite, ctx).await
    }

    async fn run_phase(&self, phase: CheckPhase, ctx: &CheckContext<'_>) -> CoreResult<Vec<Finding>> {
        let mut findings = Vec::new();
        for check in self.checks.iter().filter(|c| c.applies_to(phase)) {
            match check.run(ctx).await {
                Ok(mut found) => findings.append(&mut found),
                Err(err) => {
                    debug!("Integrity check '{}' failed during {:?}: {}", check.name(), phase, err);
                    return Err(err);
                }
            }
        }
        Ok(findings)
    }

    /// Scan every logical entity of `collection` in the scoped tenant's
    /// partition. Violations are collected and reported; nothing is healed.
    pub async fn audit(
        &self,
        router: &TenantRouter,
        scope: &TenantScope,
        collection: Collection,
        now: DateTime<Utc>,
    ) -> CoreResult<AuditReport> {
        if !matches!(collection, Collection::ConsentTemplates | Collection::Consents) {
            return Err(CoreError::invalid_input(format!("{} is not a versioned collection", collection)));
        }
        let tenant = scope.tenant_id()?;
        let partition = router.resolve_for(scope, collection)?;
        let store: &Arc<dyn DocumentStore> = router.store();

        let filter = FilterData::default().with_order(json!("logicalId asc"));
        let documents = within_deadline(scope.deadline(), store.find(&partition, collection, filter)).await?;
        let mut by_logical_id: BTreeMap<String, Vec<Document>> = BTreeMap::new();
        for document in documents {
            by_logical_id
                .entry(str_field(&document, "logicalId").to_string())
                .or_default()
                .push(document);
        }

        let mut findings = Vec::new();
        for logical_id in by_logical_id.keys() {
            let ctx = CheckContext {
                store: store.as_ref(),
                partition: &partition,
                collection,
                logical_id,
                tenant,
                subject: None,
                policy: None,
                now,
                deadline: scope.deadline(),
            };
            for check in self.checks.iter().filter(|c| c.applies_to(CheckPhase::Audit)) {
                match check.run(&ctx).await {
                    Ok(mut found) => findings.append(&mut found),
                    Err(err) if err.kind().is_retryable() || err.kind() == ErrorKind::Storage => {
                        return Err(err)
                    }
                    Err(err) => findings.push(Finding::violation(check.name(), logical_id, &err)),
                }
            }
        }

        let report = AuditReport {
            tenant: tenant.to_string(),
            collection: collection.to_string(),
            logical_ids_checked: by_logical_id.len(),
            findings,
        };
        if report.is_clean() {
            info!("Audit of {}/{} clean: {} logical ids", partition, collection, report.logical_ids_checked);
        } else {
            warn!(
                "Audit of {}/{} found {} violation(s) across {} logical ids",
                partition,
                collection,
                report.violations().count(),
                report.logical_ids_checked
            );
        }
        Ok(report)
    }
}
