use axum::Router;

pub mod campaigns;
pub mod common;
pub mod directory;
pub mod samples;
pub mod system;
pub mod webhooks;

/// Router for the operator-facing endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/campaigns", campaigns::router())
        .nest("/contacts", directory::contacts_router())
        .nest("/jobs", directory::jobs_router())
        .nest("/samples", samples::router())
}
