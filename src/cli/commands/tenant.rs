use std::sync::Arc;

use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::{output_json, output_success, print_header, print_row};
use crate::cli::OutputFormat;
use crate::services::Services;
use crate::tenancy::TenantId;

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "List provisioned tenants")]
    List,

    #[command(about = "Provision a tenant partition")]
    Create {
        #[arg(help = "Tenant ID")]
        tenant: String,
    },
}

pub async fn handle(cmd: TenantCommands, services: Arc<Services>, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::List => {
            let tenants = services.router.list_tenant_partitions().await?;
            match output_format {
                OutputFormat::Json => {
                    let names: Vec<&str> = tenants.iter().map(TenantId::as_str).collect();
                    output_json(&json!({ "tenants": names }))?;
                }
                OutputFormat::Text => {
                    if tenants.is_empty() {
                        println!("No tenants provisioned");
                        return Ok(());
                    }
                    print_header("TENANT", "PARTITION");
                    for tenant in &tenants {
                        print_row(tenant, services.router.resolve_partition(tenant.as_str()).name());
                    }
                }
            }
            Ok(())
        }
        TenantCommands::Create { tenant } => {
            let tenant = TenantId::parse(&tenant)?;
            let partition = services.router.provision(&tenant).await?;
            output_success(
                output_format,
                &format!("Provisioned tenant {} ({})", tenant, partition.name()),
                Some(json!({ "tenant": tenant.as_str(), "partition": partition.name() })),
            )
        }
    }
}
