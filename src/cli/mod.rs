pub mod commands;
pub mod utils;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::clock::SystemClock;
use crate::config::AppConfig;
use crate::database::{DocumentStore, MemoryStore, PgDocumentStore};
use crate::services::Services;

#[derive(Parser)]
#[command(name = "consent-vault")]
#[command(about = "Consent Vault - multi-tenant consent and template record store")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Run the HTTP server (default)")]
    Serve {
        #[arg(long, help = "Override the configured port")]
        port: Option<u16>,
    },

    #[command(about = "Run one expiry sweep across all tenants and exit")]
    Sweep,

    #[command(about = "Audit one versioned collection of a tenant")]
    Audit {
        #[arg(help = "Tenant ID")]
        tenant: String,
        #[arg(help = "consent_templates or consents")]
        collection: String,
    },

    #[command(about = "Tenant partition management")]
    Tenant {
        #[command(subcommand)]
        cmd: commands::tenant::TenantCommands,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Pick the document store: Postgres when a database URL is configured,
/// otherwise the in-process store.
pub fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn DocumentStore>> {
    if config.database.url.is_some() {
        let store = PgDocumentStore::new(&config.database)?;
        tracing::info!("Using PostgreSQL document store");
        Ok(Arc::new(store))
    } else {
        tracing::warn!("DATABASE_URL not set; using in-memory document store");
        Ok(Arc::new(MemoryStore::new()))
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let config = AppConfig::from_env();
    tracing::info!("Starting Consent Vault in {:?} mode", config.environment);

    let store = open_store(&config)?;
    let services = Arc::new(Services::new(store, config, Arc::new(SystemClock)));
    services.router.ensure_shared_partition().await?;

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => commands::serve::handle(services, port).await,
        Commands::Sweep => commands::admin::sweep(services, output_format).await,
        Commands::Audit { tenant, collection } => {
            commands::admin::audit(services, &tenant, &collection, output_format).await
        }
        Commands::Tenant { cmd } => commands::tenant::handle(cmd, services, output_format).await,
    }
}
