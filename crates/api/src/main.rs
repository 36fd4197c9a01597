use anyhow::Context;

use posledger_api::app::{build_app, build_services};
use posledger_api::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    posledger_observability::init();

    let config = AppConfig::from_env()?;
    let services = build_services(&config)
        .await
        .context("failed to start ledger services")?;
    let hub = services.hub.clone();
    let app = build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "cannot listen for ctrl-c; shutting down");
            }
            tracing::info!("shutdown requested");
            // Closes push sockets and ends pull sessions so serve can drain.
            hub.shutdown();
        })
        .await?;

    Ok(())
}
