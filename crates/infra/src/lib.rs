//! Infrastructure layer: storage adapters, outbound HTTP, the dispatch worker,
//! result reconciliation and the engine façade that ties them together.

mod audit;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod outbound;
pub mod reconciler;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use dispatch::{DispatchConfig, DispatchHandle, DispatchReport, StopReason};
pub use engine::{CampaignEngine, CampaignStatusView, EngineError};
pub use outbound::{CallOutcome, HttpOutboundCaller, OutboundCaller};
pub use reconciler::{ReconcileReport, ResultReconciler, SkippedRecord};
pub use store::{
    AppliedUpdate, CampaignStore, CampaignTransition, Lifecycle, ResultPage, ResultQuery,
    StoreError, in_memory::InMemoryCampaignStore, postgres::PostgresCampaignStore,
};
