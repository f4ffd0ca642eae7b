use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use outreach_core::SampleRequestId;
use outreach_infra::CampaignEngine;

use crate::app::errors;

pub fn router() -> Router {
    Router::new().route("/:id", get(get_sample_request))
}

pub async fn get_sample_request(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: SampleRequestId = match errors::parse_id(&id, "sample request") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match engine.sample_request(id).await {
        Ok(sample) => (StatusCode::OK, Json(sample)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
