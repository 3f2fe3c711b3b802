use std::sync::Arc;

use crate::handlers::app;
use crate::services::Services;

pub async fn handle(services: Arc<Services>, port: Option<u16>) -> anyhow::Result<()> {
    let sweep_task = if services.config.sweeper.enabled {
        Some(services.sweeper.clone().spawn_scheduled(&services.config.sweeper.schedule)?)
    } else {
        tracing::info!("Scheduled expiry sweep disabled");
        None
    };

    let port = port.unwrap_or(services.config.api.port);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Consent Vault listening on http://{}", bind_addr);

    axum::serve(listener, app(services))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(task) = sweep_task {
        task.abort();
    }
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
