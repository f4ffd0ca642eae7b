//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/engine wiring and dispatch supervision
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use outreach_infra::CampaignEngine;

use crate::middleware::ApiKeyState;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app(engine: Arc<CampaignEngine>, callback_api_key: impl Into<Arc<str>>) -> Router {
    let api_key = ApiKeyState::new(callback_api_key);

    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .nest("/webhooks", routes::webhooks::router(api_key))
        .layer(Extension(engine))
        .layer(ServiceBuilder::new())
}
