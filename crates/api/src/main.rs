use anyhow::Context;

use outreach_infra::EngineConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    outreach_observability::init();

    let config = EngineConfig::from_env().context("invalid configuration")?;
    let engine = outreach_api::app::services::build_engine(&config).await?;

    let app = outreach_api::app::build_app(engine.clone(), config.callback_api_key.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down; stopping dispatch workers");
            engine.shutdown();
        })
        .await
        .context("server error")?;

    Ok(())
}
