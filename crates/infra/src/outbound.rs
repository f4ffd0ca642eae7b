//! Outbound call adapter: one bounded `POST` to a job's webhook URL.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};

use outreach_campaigns::JobConfig;

/// Classified outcome of one outbound call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallOutcome {
    /// 2xx. `body` is the parsed JSON, the raw text, or `{}` when empty.
    Success { status: u16, body: JsonValue },
    /// Non-2xx.
    RemoteError { status: u16, body: String },
    /// Connection failure, timeout, or a request that could not be built.
    TransportError { description: String },
}

impl CallOutcome {
    /// Human-readable failure detail recorded on the result row.
    pub fn error_detail(&self) -> Option<String> {
        match self {
            CallOutcome::Success { .. } => None,
            CallOutcome::RemoteError { status, body } => Some(format!("HTTP {status}: {body}")),
            CallOutcome::TransportError { description } => Some(description.clone()),
        }
    }
}

/// Something that can deliver a dispatch payload to a job endpoint.
///
/// Exactly one attempt per call; no retries.
#[async_trait]
pub trait OutboundCaller: Send + Sync {
    async fn call(&self, job: &JobConfig, payload: &JsonValue) -> CallOutcome;
}

#[async_trait]
impl<C> OutboundCaller for Arc<C>
where
    C: OutboundCaller + ?Sized,
{
    async fn call(&self, job: &JobConfig, payload: &JsonValue) -> CallOutcome {
        (**self).call(job, payload).await
    }
}

/// `reqwest`-backed caller with a fixed per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpOutboundCaller {
    client: reqwest::Client,
}

impl HttpOutboundCaller {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl OutboundCaller for HttpOutboundCaller {
    async fn call(&self, job: &JobConfig, payload: &JsonValue) -> CallOutcome {
        let mut request = self
            .client
            .post(&job.webhook_url)
            .header("Content-Type", "application/json");
        for (name, value) in &job.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = match request.json(payload).send().await {
            Ok(response) => response,
            Err(e) => {
                let description = if e.is_timeout() {
                    format!("request timed out: {e}")
                } else {
                    format!("request failed: {e}")
                };
                warn!(job = %job.name, url = %job.webhook_url, error = %e, "outbound call failed");
                return CallOutcome::TransportError { description };
            }
        };

        let status = response.status();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                return CallOutcome::TransportError {
                    description: format!("failed to read response body: {e}"),
                };
            }
        };
        debug!(job = %job.name, status = status.as_u16(), "outbound call returned");

        if status.is_success() {
            CallOutcome::Success {
                status: status.as_u16(),
                body: parse_body(&text),
            }
        } else {
            CallOutcome::RemoteError {
                status: status.as_u16(),
                body: text,
            }
        }
    }
}

fn parse_body(text: &str) -> JsonValue {
    if text.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(text).unwrap_or_else(|_| JsonValue::String(text.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn body_parsing_rules() {
        assert_eq!(parse_body(""), json!({}));
        assert_eq!(parse_body("{\"ok\":true}"), json!({"ok": true}));
        assert_eq!(parse_body("Accepted"), json!("Accepted"));
    }

    #[test]
    fn error_detail_formats_remote_errors() {
        let outcome = CallOutcome::RemoteError {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(outcome.error_detail().as_deref(), Some("HTTP 503: busy"));
    }

    #[tokio::test]
    async fn success_carries_static_headers_and_parsed_body() {
        let app = Router::new().route(
            "/hook",
            post(|headers: HeaderMap| async move {
                let tag = headers
                    .get("x-scenario")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                axum::Json(json!({ "accepted": true, "tag": tag }))
            }),
        );
        let base = serve(app).await;
        let job = JobConfig::new("hook", format!("{base}/hook")).with_header("X-Scenario", "s-1");

        let caller = HttpOutboundCaller::new(Duration::from_secs(5)).unwrap();
        let outcome = caller.call(&job, &json!({"contact_id": "c"})).await;

        assert_eq!(
            outcome,
            CallOutcome::Success {
                status: 200,
                body: json!({ "accepted": true, "tag": "s-1" })
            }
        );
    }

    #[tokio::test]
    async fn non_success_status_is_a_remote_error() {
        let app = Router::new().route(
            "/hook",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(app).await;
        let job = JobConfig::new("hook", format!("{base}/hook"));

        let caller = HttpOutboundCaller::new(Duration::from_secs(5)).unwrap();
        let outcome = caller.call(&job, &json!({})).await;

        assert_eq!(
            outcome,
            CallOutcome::RemoteError {
                status: 500,
                body: "boom".into()
            }
        );
    }

    #[tokio::test]
    async fn timeout_is_a_transport_error() {
        let app = Router::new().route(
            "/hook",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                "late"
            }),
        );
        let base = serve(app).await;
        let job = JobConfig::new("hook", format!("{base}/hook"));

        let caller = HttpOutboundCaller::new(Duration::from_millis(100)).unwrap();
        let outcome = caller.call(&job, &json!({})).await;

        assert!(matches!(outcome, CallOutcome::TransportError { .. }));
    }
}
