//! Contacts and job configurations referenced by campaigns.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use outreach_core::ContactId;
use outreach_infra::{CampaignEngine, EngineError};

use crate::app::{dto, errors};

pub fn contacts_router() -> Router {
    Router::new()
        .route("/", post(create_contact))
        .route("/:id", get(get_contact))
}

pub fn jobs_router() -> Router {
    Router::new().route("/:name", get(get_job).put(upsert_job))
}

pub async fn create_contact(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Json(body): Json<dto::CreateContactRequest>,
) -> axum::response::Response {
    if body.email_address.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "email_address is required",
        );
    }

    let contact = body.into_contact(ContactId::new());
    match engine.store().save_contact(contact.clone()).await {
        Ok(()) => (StatusCode::CREATED, Json(contact)).into_response(),
        Err(e) => errors::engine_error_to_response(e.into()),
    }
}

pub async fn get_contact(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: ContactId = match errors::parse_id(&id, "contact") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match engine.store().contact(id).await {
        Ok(Some(contact)) => (StatusCode::OK, Json(contact)).into_response(),
        Ok(None) => errors::engine_error_to_response(EngineError::NotFound(format!("contact {id}"))),
        Err(e) => errors::engine_error_to_response(e.into()),
    }
}

pub async fn upsert_job(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Path(name): Path<String>,
    Json(body): Json<dto::UpsertJobRequest>,
) -> axum::response::Response {
    if body.webhook_url.trim().is_empty() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "webhook_url is required",
        );
    }

    let job = body.into_job(name);
    match engine.store().save_job(job.clone()).await {
        Ok(()) => (StatusCode::OK, Json(job)).into_response(),
        Err(e) => errors::engine_error_to_response(e.into()),
    }
}

pub async fn get_job(
    Extension(engine): Extension<Arc<CampaignEngine>>,
    Path(name): Path<String>,
) -> axum::response::Response {
    match engine.store().job(&name).await {
        Ok(Some(job)) => (StatusCode::OK, Json(job)).into_response(),
        Ok(None) => errors::engine_error_to_response(EngineError::NotFound(format!("job {name}"))),
        Err(e) => errors::engine_error_to_response(e.into()),
    }
}
