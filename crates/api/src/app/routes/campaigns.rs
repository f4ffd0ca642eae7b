use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use outreach_campaigns::{CampaignDefinition, CampaignStatus};
use outreach_core::CampaignId;
use outreach_infra::{CampaignEngine, ResultQuery};

use crate::app::routes::common::actor_from_headers;
use crate::app::{dto, errors, services};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_campaign))
        .route("/:id", get(get_campaign))
        .route("/:id/start", post(start_campaign))
        .route("/:id/pause", post(pause_campaign))
        .route("/:id/status", get(campaign_status))
        .route("/:id/results", get(list_results))
}

pub async fn create_campaign(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Json(body): Json<CampaignDefinition>,
) -> axum::response::Response {
    match engine.create_campaign(body).await {
        Ok(campaign) => (StatusCode::CREATED, Json(campaign)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_campaign(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CampaignId = match errors::parse_id(&id, "campaign") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match engine.campaign(id).await {
        Ok(campaign) => (StatusCode::OK, Json(campaign)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

/// `draft → running`. Answers 202 once the worker is spawned; the dispatch
/// itself is observed through `/status`.
pub async fn start_campaign(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CampaignId = match errors::parse_id(&id, "campaign") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let handle = match engine.start_campaign(id, actor_from_headers(&headers)).await {
        Ok(h) => h,
        Err(e) => return errors::engine_error_to_response(e),
    };
    services::supervise(handle);

    let total_contacts = match engine.campaign(id).await {
        Ok(campaign) => campaign.contact_ids().len(),
        Err(e) => return errors::engine_error_to_response(e),
    };

    (
        StatusCode::ACCEPTED,
        Json(dto::StartCampaignResponse {
            campaign_id: id,
            status: CampaignStatus::Running,
            total_contacts,
        }),
    )
        .into_response()
}

pub async fn pause_campaign(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CampaignId = match errors::parse_id(&id, "campaign") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match engine.pause_campaign(id, actor_from_headers(&headers)).await {
        Ok(campaign) => (StatusCode::OK, Json(campaign)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn campaign_status(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: CampaignId = match errors::parse_id(&id, "campaign") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match engine.status(id).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_results(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Path(id): Path<String>,
    Query(query): Query<ResultQuery>,
) -> axum::response::Response {
    let id: CampaignId = match errors::parse_id(&id, "campaign") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match engine.results(id, &query).await {
        Ok(page) => (StatusCode::OK, Json(page)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
