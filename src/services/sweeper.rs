use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clock::SharedClock;
use crate::database::{within_deadline, Collection, Document};
use crate::error::{CoreError, CoreResult};
use crate::models::ConsentStatus;
use crate::tenancy::{with_tenant, TenantId, TenantRouter};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub transitioned: u64,
    pub per_tenant: BTreeMap<String, u64>,
    /// Tenant -> failure message
    pub failures: BTreeMap<String, String>,
}

/// Moves ACTIVE consents past their `endDate` to EXPIRED in every tenant
/// partition. Documents are never deleted.
pub struct ExpirySweeper {
    router: TenantRouter,
    clock: SharedClock,
    deadline: Duration,
}

impl ExpirySweeper {
    pub fn new(router: TenantRouter, clock: SharedClock, deadline: Duration) -> Self {
        Self { router, clock, deadline }
    }

    pub async fn run_once(&self, now: DateTime<Utc>) -> CoreResult<SweepReport> {
        let tenants = self.router.list_tenant_partitions().await?;
        let mut report = SweepReport::default();

        for tenant in tenants {
            match self.sweep_tenant(tenant.clone(), now).await {
                Ok(count) => {
                    if count > 0 {
                        info!("Expired {} consent(s) for tenant {}", count, tenant);
                    }
                    report.transitioned += count;
                    report.per_tenant.insert(tenant.to_string(), count);
                }
                Err(err) => {
                    error!("Expiry sweep failed for tenant {}: {}", tenant, err);
                    report.failures.insert(tenant.to_string(), err.to_string());
                }
            }
        }

        info!(
            "Expiry sweep finished: {} transitioned across {} tenant(s), {} failure(s)",
            report.transitioned,
            report.per_tenant.len(),
            report.failures.len()
        );
        Ok(report)
    }

    async fn sweep_tenant(&self, tenant: TenantId, now: DateTime<Utc>) -> CoreResult<u64> {
        with_tenant(tenant, self.deadline, |scope| async move {
            let partition = self.router.resolve_for(&scope, Collection::Consents)?;
            let condition = json!({
                "versionStatus": "ACTIVE",
                "status": ConsentStatus::Active.as_str(),
                "endDate": { "$lt": now.timestamp_millis() }
            });
            let mut set = Document::new();
            set.insert("status".into(), json!(ConsentStatus::Expired.as_str()));
            set.insert("updatedAt".into(), json!(now.timestamp_millis()));

            let count = within_deadline(
                scope.deadline(),
                self.router.store().update_many(&partition, Collection::Consents, condition, set),
            )
            .await?;
            Ok::<u64, CoreError>(count)
        })
        .await
    }

    /// Run the sweep on a 6-field cron schedule until the task is aborted
    pub fn spawn_scheduled(self: Arc<Self>, expression: &str) -> CoreResult<JoinHandle<()>> {
        let schedule = Schedule::from_str(expression)
            .map_err(|e| CoreError::invalid_input(format!("Invalid sweep schedule '{}': {}", expression, e)))?;
        info!("Expiry sweep scheduled: {}", expression);

        Ok(tokio::spawn(async move {
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    warn!("Sweep schedule has no upcoming fire times; stopping");
                    break;
                };
                let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                if let Err(err) = self.run_once(self.clock.now()).await {
                    error!("Expiry sweep aborted: {}", err);
                }
            }
        }))
    }
}
