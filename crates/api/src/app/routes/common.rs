use axum::http::HeaderMap;

use outreach_events::Actor;

/// Free-form caller label for audit entries.
pub const REQUESTED_BY_HEADER: &str = "x-requested-by";

/// The audit actor of an operator request: `X-Requested-By`, or `api`.
pub fn actor_from_headers(headers: &HeaderMap) -> Actor {
    let label = headers
        .get(REQUESTED_BY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("api");
    Actor::Api(label.to_string())
}
