use std::sync::Arc;

use anyhow::anyhow;

use crate::cli::utils::{output_json, print_header, print_row};
use crate::cli::OutputFormat;
use crate::database::Collection;
use crate::services::Services;
use crate::tenancy::{with_tenant, TenantId};

pub async fn sweep(services: Arc<Services>, output_format: OutputFormat) -> anyhow::Result<()> {
    let report = services.sweeper.run_once(services.clock.now()).await?;
    match output_format {
        OutputFormat::Json => output_json(&report)?,
        OutputFormat::Text => {
            print_header("TENANT", "EXPIRED");
            for (tenant, count) in &report.per_tenant {
                print_row(tenant, count);
            }
            for (tenant, message) in &report.failures {
                print_row(tenant, format!("FAILED: {}", message));
            }
            println!("Total transitioned: {}", report.transitioned);
        }
    }
    Ok(())
}

pub async fn audit(
    services: Arc<Services>,
    tenant: &str,
    collection: &str,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let tenant = TenantId::parse(tenant)?;
    let collection = Collection::parse(collection).ok_or_else(|| anyhow!("Unknown collection '{}'", collection))?;

    let report = with_tenant(tenant, services.deadline(), |scope| async move {
        services
            .validator
            .audit(&services.router, &scope, collection, services.clock.now())
            .await
    })
    .await?;

    match output_format {
        OutputFormat::Json => output_json(&report)?,
        OutputFormat::Text => {
            println!(
                "Audited {} logical id(s) in {} for tenant {}",
                report.logical_ids_checked, report.collection, report.tenant
            );
            for finding in &report.findings {
                println!(
                    "{:?} [{}] {}: {}",
                    finding.severity, finding.check, finding.logical_id, finding.message
                );
            }
            if report.is_clean() {
                println!("✓ No violations");
            }
        }
    }
    Ok(())
}
