//! Infrastructure wiring: store selection, outbound adapter, audit recorder,
//! and supervision of detached dispatch workers.

use std::sync::Arc;

use anyhow::Context;

use outreach_events::{AuditRecorder, InMemoryAuditRecorder, TracingAuditRecorder};
use outreach_infra::{
    CampaignEngine, CampaignStore, DispatchConfig, DispatchHandle, EngineConfig,
    HttpOutboundCaller, InMemoryCampaignStore, PostgresCampaignStore,
};

/// Pick the store from configuration: Postgres when `DATABASE_URL` is set
/// (schema applied on boot), in-memory otherwise.
pub async fn build_store(config: &EngineConfig) -> anyhow::Result<Arc<dyn CampaignStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresCampaignStore::connect(url)
                .await
                .context("failed to connect to Postgres")?;
            store
                .apply_schema()
                .await
                .context("failed to apply schema")?;
            tracing::info!("using postgres campaign store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory campaign store");
            Ok(Arc::new(InMemoryCampaignStore::new()))
        }
    }
}

/// Wire the engine used by the HTTP layer.
pub async fn build_engine(config: &EngineConfig) -> anyhow::Result<Arc<CampaignEngine>> {
    let store = build_store(config).await?;
    let outbound = HttpOutboundCaller::new(config.outbound_timeout)
        .context("failed to build outbound http client")?;
    let audit: Arc<dyn AuditRecorder> =
        Arc::new(TracingAuditRecorder::new(InMemoryAuditRecorder::new()));

    Ok(Arc::new(CampaignEngine::new(
        store,
        Arc::new(outbound),
        audit,
        DispatchConfig::default().with_delay(config.dispatch_delay),
    )))
}

/// Let a dispatch worker run detached from the request that started it and log
/// how it ended.
pub fn supervise(handle: DispatchHandle) {
    let campaign_id = handle.campaign_id();
    tokio::spawn(async move {
        match handle.wait().await {
            Ok(report) => tracing::info!(
                campaign_id = %campaign_id,
                attempted = report.attempted,
                sent = report.sent,
                failed = report.failed,
                superseded = report.superseded,
                final_status = ?report.final_status,
                stopped = ?report.stopped,
                "dispatch finished"
            ),
            Err(e) => tracing::error!(campaign_id = %campaign_id, error = %e, "dispatch worker failed"),
        }
    });
}
