use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{extract::Extension, response::IntoResponse, routing::post, Json, Router};
use outreach_events::InMemoryAuditRecorder;
use outreach_infra::{
    CampaignEngine, DispatchConfig, HttpOutboundCaller, InMemoryCampaignStore,
};
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};

const API_KEY: &str = "test-callback-key";

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(app: Router) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    /// The campaign API with an in-memory store and a short dispatch delay.
    async fn api() -> Self {
        let engine = CampaignEngine::new(
            Arc::new(InMemoryCampaignStore::new()),
            Arc::new(HttpOutboundCaller::new(Duration::from_secs(2)).unwrap()),
            Arc::new(InMemoryAuditRecorder::new()),
            DispatchConfig::default().with_delay(Duration::from_millis(10)),
        );
        Self::spawn(outreach_api::app::build_app(Arc::new(engine), API_KEY)).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Stands in for the external automation platform. Contacts whose email
/// contains `fail` get a 500.
#[derive(Clone, Default)]
struct FakeAutomation {
    calls: Arc<Mutex<Vec<JsonValue>>>,
}

impl FakeAutomation {
    async fn spawn() -> (Self, TestServer) {
        let fake = FakeAutomation::default();
        let app = Router::new()
            .route("/hook", post(automation_endpoint))
            .layer(Extension(fake.clone()));
        (fake, TestServer::spawn(app).await)
    }

    fn calls(&self) -> Vec<JsonValue> {
        self.calls.lock().unwrap().clone()
    }
}

async fn automation_endpoint(
    Extension(fake): Extension<FakeAutomation>,
    Json(body): Json<JsonValue>,
) -> axum::response::Response {
    fake.calls.lock().unwrap().push(body.clone());
    let email = body["contact_data"]["email_address"].as_str().unwrap_or_default();
    if email.contains("fail") {
        (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "scenario exploded").into_response()
    } else {
        Json(json!({ "accepted": true })).into_response()
    }
}

async fn create_contact(client: &reqwest::Client, srv: &TestServer, email: &str) -> String {
    let res = client
        .post(srv.url("/contacts"))
        .json(&json!({
            "first_name": "Test",
            "last_name": email,
            "email_address": email,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: JsonValue = res.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn put_job(client: &reqwest::Client, srv: &TestServer, name: &str, webhook_url: &str) {
    let res = client
        .put(srv.url(&format!("/jobs/{name}")))
        .json(&json!({ "webhook_url": webhook_url, "headers": { "x-scenario-key": "s3cret" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

async fn create_campaign(
    client: &reqwest::Client,
    srv: &TestServer,
    job_name: &str,
    contact_ids: &[String],
) -> String {
    let res = client
        .post(srv.url("/campaigns"))
        .json(&json!({
            "name": "Spring outreach",
            "created_by": "ops@example.com",
            "job_name": job_name,
            "contact_ids": contact_ids,
            "settings": { "template": "spring-2026" },
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["status"], "draft");
    body["id"].as_str().unwrap().to_string()
}

async fn status_eventually(
    client: &reqwest::Client,
    srv: &TestServer,
    campaign_id: &str,
    wanted: &str,
) -> JsonValue {
    for _ in 0..200 {
        let res = client
            .get(srv.url(&format!("/campaigns/{campaign_id}/status")))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: JsonValue = res.json().await.unwrap();
        if body["status"] == wanted {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("campaign {campaign_id} never reached status {wanted}");
}

async fn post_callback(client: &reqwest::Client, srv: &TestServer, body: JsonValue) -> JsonValue {
    let res = client
        .post(srv.url("/webhooks/campaign-results"))
        .header("X-API-Key", API_KEY)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    res.json().await.unwrap()
}

/// Job + three contacts (the last one fails at the automation endpoint),
/// run to completion.
async fn completed_campaign(
    client: &reqwest::Client,
    srv: &TestServer,
    hook: &TestServer,
) -> (String, Vec<String>) {
    put_job(client, srv, "welcome", &hook.url("/hook")).await;
    let contacts = vec![
        create_contact(client, srv, "a@example.com").await,
        create_contact(client, srv, "b@example.com").await,
        create_contact(client, srv, "c@fail.example.com").await,
    ];
    let campaign_id = create_campaign(client, srv, "welcome", &contacts).await;

    let res = client
        .post(srv.url(&format!("/campaigns/{campaign_id}/start")))
        .header("X-Requested-By", "ops@example.com")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let started: JsonValue = res.json().await.unwrap();
    assert_eq!(started["status"], "running");
    assert_eq!(started["total_contacts"], 3);

    status_eventually(client, srv, &campaign_id, "completed").await;
    (campaign_id, contacts)
}

#[tokio::test]
async fn health_is_public() {
    let srv = TestServer::api().await;
    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn campaign_runs_to_completion_and_late_callbacks_reconcile() {
    let srv = TestServer::api().await;
    let (hook_state, hook) = FakeAutomation::spawn().await;
    let client = reqwest::Client::new();

    let (campaign_id, contacts) = completed_campaign(&client, &srv, &hook).await;

    let status = status_eventually(&client, &srv, &campaign_id, "completed").await;
    assert_eq!(status["progress"]["total"], 3);
    assert_eq!(status["progress"]["processed"], 3);
    assert_eq!(status["progress"]["successful"], 2);
    assert_eq!(status["progress"]["failed"], 1);
    assert!(status["execution_start_time"].is_string());
    assert!(status["execution_end_time"].is_string());

    let calls = hook_state.calls();
    assert_eq!(calls.len(), 3);
    for (call, contact_id) in calls.iter().zip(&contacts) {
        assert_eq!(call["campaign_id"], campaign_id.as_str());
        assert_eq!(call["contact_id"], contact_id.as_str());
        assert!(call["result_id"].is_string());
        assert_eq!(call["campaign_settings"]["template"], "spring-2026");
    }

    // A delivered callback for a sent row stays in the same bucket.
    let report = post_callback(
        &client,
        &srv,
        json!({ "campaign_id": campaign_id, "contact_id": contacts[0], "status": "delivered" }),
    )
    .await;
    assert_eq!(report["success"], true);
    assert_eq!(report["updated_contacts"], 1);
    assert_eq!(report["total_results"], 1);

    // The endpoint reports the failed contact as delivered after all.
    post_callback(
        &client,
        &srv,
        json!({ "campaign_id": campaign_id, "contact_id": contacts[2], "status": "delivered" }),
    )
    .await;

    let status = status_eventually(&client, &srv, &campaign_id, "completed").await;
    assert_eq!(status["progress"]["processed"], 3);
    assert_eq!(status["progress"]["successful"], 3);
    assert_eq!(status["progress"]["failed"], 0);

    let res = client
        .get(srv.url(&format!("/campaigns/{campaign_id}/results?status=delivered")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let page: JsonValue = res.json().await.unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn regressing_callback_does_not_move_counters() {
    let srv = TestServer::api().await;
    let (_hook_state, hook) = FakeAutomation::spawn().await;
    let client = reqwest::Client::new();
    let (campaign_id, contacts) = completed_campaign(&client, &srv, &hook).await;

    post_callback(
        &client,
        &srv,
        json!({ "campaign_id": campaign_id, "contact_id": contacts[0], "status": "bounced" }),
    )
    .await;
    let report = post_callback(
        &client,
        &srv,
        json!({ "campaign_id": campaign_id, "contact_id": contacts[0], "status": "delivered" }),
    )
    .await;
    assert_eq!(report["updated_contacts"], 0);

    let status = status_eventually(&client, &srv, &campaign_id, "completed").await;
    assert_eq!(status["progress"]["successful"], 1);
    assert_eq!(status["progress"]["failed"], 2);
}

#[tokio::test]
async fn malformed_batch_record_is_skipped_and_the_rest_applied() {
    let srv = TestServer::api().await;
    let (_hook_state, hook) = FakeAutomation::spawn().await;
    let client = reqwest::Client::new();
    let (campaign_id, contacts) = completed_campaign(&client, &srv, &hook).await;

    let report = post_callback(
        &client,
        &srv,
        json!({
            "execution_id": "exec-7",
            "results": [
                { "campaign_id": campaign_id, "contact_id": contacts[1], "status": "delivered" },
                { "campaign_id": campaign_id, "contact_id": contacts[0] },
            ]
        }),
    )
    .await;
    assert_eq!(report["updated_contacts"], 1);
    assert_eq!(report["total_results"], 2);
    let skipped = report["skipped"].as_array().unwrap();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0]["index"], 1);
    assert_eq!(skipped[0]["reason"], "missing status");

    let page: JsonValue = client
        .get(srv.url(&format!("/campaigns/{campaign_id}/results?status=delivered")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["items"][0]["execution_id"], "exec-7");

    let activity: JsonValue = client
        .get(srv.url("/webhooks/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(activity["count"].as_u64().unwrap() >= 2);
}

#[tokio::test]
async fn callbacks_require_the_api_key() {
    let srv = TestServer::api().await;
    let client = reqwest::Client::new();
    let body = json!({ "results": [] });

    let res = client
        .post(srv.url("/webhooks/campaign-results"))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/webhooks/campaign-results"))
        .header("X-API-Key", "wrong-key")
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = client
        .post(srv.url("/webhooks/campaign-results"))
        .header("X-API-Key", API_KEY)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn empty_campaign_fails_setup_with_422() {
    let srv = TestServer::api().await;
    let (hook_state, hook) = FakeAutomation::spawn().await;
    let client = reqwest::Client::new();

    put_job(&client, &srv, "welcome", &hook.url("/hook")).await;
    let campaign_id = create_campaign(&client, &srv, "welcome", &[]).await;

    let res = client
        .post(srv.url(&format!("/campaigns/{campaign_id}/start")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "setup_fault");

    let status = status_eventually(&client, &srv, &campaign_id, "failed").await;
    assert_eq!(status["progress"]["processed"], 0);
    assert!(hook_state.calls().is_empty());
}

#[tokio::test]
async fn restarting_a_campaign_conflicts() {
    let srv = TestServer::api().await;
    let (_hook_state, hook) = FakeAutomation::spawn().await;
    let client = reqwest::Client::new();
    let (campaign_id, _contacts) = completed_campaign(&client, &srv, &hook).await;

    let res = client
        .post(srv.url(&format!("/campaigns/{campaign_id}/start")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_and_malformed_ids() {
    let srv = TestServer::api().await;
    let client = reqwest::Client::new();

    let res = client
        .get(srv.url(&format!(
            "/campaigns/{}/status",
            outreach_core::CampaignId::new()
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url(&format!(
            "/campaigns/{}/results",
            outreach_core::CampaignId::new()
        )))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);

    let res = client
        .get(srv.url("/campaigns/not-a-uuid"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "invalid_id");
}

#[tokio::test]
async fn campaign_creation_rejects_unknown_job() {
    let srv = TestServer::api().await;
    let client = reqwest::Client::new();
    let contact = create_contact(&client, &srv, "a@example.com").await;

    let res = client
        .post(srv.url("/campaigns"))
        .json(&json!({
            "name": "Orphan",
            "created_by": "ops@example.com",
            "job_name": "missing-job",
            "contact_ids": [contact],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: JsonValue = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}
