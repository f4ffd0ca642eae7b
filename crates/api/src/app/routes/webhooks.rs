//! Inbound result callbacks from the automation platform.

use std::sync::Arc;

use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use outreach_infra::CampaignEngine;

use crate::app::errors;
use crate::middleware::{self, ApiKeyState};

const DEFAULT_ACTIVITY_LIMIT: usize = 20;
const MAX_ACTIVITY_LIMIT: usize = 200;

/// `/campaign-results` requires the callback API key; `/status` is open.
pub fn router(api_key: ApiKeyState) -> Router {
    Router::new()
        .route("/campaign-results", post(campaign_results))
        .route_layer(axum::middleware::from_fn_with_state(
            api_key,
            middleware::api_key_middleware,
        ))
        .route("/status", get(webhook_status))
}

/// Accepts a single record or a `{"results": [...]}` batch. Malformed records
/// are skipped and reported; the rest are applied.
pub async fn campaign_results(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Json(body): Json<JsonValue>,
) -> axum::response::Response {
    match engine.reconcile(&body).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<usize>,
}

pub async fn webhook_status(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Query(query): Query<ActivityQuery>,
) -> axum::response::Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_ACTIVITY_LIMIT)
        .clamp(1, MAX_ACTIVITY_LIMIT);
    let recent = engine.recent_callbacks(limit);

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "active",
            "count": recent.len(),
            "recent_activity": recent,
        })),
    )
        .into_response()
}
