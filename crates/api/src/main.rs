use std::sync::Arc;

use anyhow::Context;

use replenish_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    replenish_observability::init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let bind_addr = config.bind_addr.clone();

    let services = Arc::new(replenish_api::app::services::build_services(config).await?);
    let monitor = services.engine.spawn_monitor();

    let app = replenish_api::app::build_app(Arc::clone(&services));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    monitor.shutdown().await;
    services.engine.drain_workflows().await;
    Ok(())
}
