//! End-to-end tests of the HTTP surface over in-memory collaborators.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tower::ServiceExt;

use rd_assistant::{ScriptedAssistant, Step};
use rd_domain::clock::ManualClock;
use rd_domain::config::{Config, Employee, TenantConfig, ToolCategory};
use rd_gateway::api::inbound::{sign, SIGNATURE_HEADER};
use rd_gateway::bootstrap::{wire_app_state, Dependencies};
use rd_gateway::state::AppState;
use rd_gateway::transport::MemoryTransport;
use rd_store::DocumentStore;

const TOKEN: &str = "test-token";
const SECRET: &[u8] = b"inbound-secret";

struct Harness {
    app: Router,
    state: AppState,
    clock: Arc<ManualClock>,
    assistant: Arc<ScriptedAssistant>,
    transport: Arc<MemoryTransport>,
}

fn staff(name: &str, role: &str, weight: u32) -> Employee {
    Employee {
        name: name.into(),
        phone: format!("{name}-phone"),
        weight,
        role: role.into(),
        group: None,
    }
}

fn harness(api_token: Option<&str>, inbound_secret: Option<&[u8]>) -> Harness {
    let mut tenants = HashMap::new();
    tenants.insert(
        "acme".to_owned(),
        TenantConfig {
            name: "Acme".into(),
            assistant_id: "asst_acme".into(),
            timezone: "America/Sao_Paulo".into(),
            debounce_window_secs: Some(10),
            tools: vec![ToolCategory::Followups, ToolCategory::Tagging],
            staff: vec![
                staff("maria", "manager", 1),
                staff("sam", "sales", 1),
            ],
            ..TenantConfig::default()
        },
    );
    let mut config = Config {
        tenants,
        ..Config::default()
    };
    config.storage.in_memory = true;

    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap(),
    ));
    let assistant = Arc::new(ScriptedAssistant::new());
    let transport = Arc::new(MemoryTransport::new());

    let state = wire_app_state(Dependencies {
        config: Arc::new(config),
        clock: clock.clone(),
        docs: Arc::new(DocumentStore::in_memory()),
        assistant: assistant.clone(),
        transport: transport.clone(),
        api_token_hash: api_token.map(|t| Sha256::digest(t.as_bytes()).to_vec()),
        inbound_secret: inbound_secret.map(<[u8]>::to_vec),
    });
    Harness {
        app: rd_gateway::api::router(state.clone()),
        state,
        clock,
        assistant,
        transport,
    }
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"));
    let body = match body {
        Some(v) => {
            req = req.header(header::CONTENT_TYPE, "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = app.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn signed_inbound(body: &Value, signature: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/v1/tenants/acme/inbound")
        .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
        .header(header::CONTENT_TYPE, "application/json")
        .header(SIGNATURE_HEADER, format!("sha256={signature}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── Auth & health ───────────────────────────────────────────────────

#[tokio::test]
async fn health_is_public_and_tenant_routes_need_the_token() {
    let h = harness(Some(TOKEN), None);

    let resp = h
        .app
        .clone()
        .oneshot(Request::get("/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let resp = h
        .app
        .clone()
        .oneshot(
            Request::delete("/v1/tenants/acme/sessions/5511")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let (status, body) = call(&h.app, Method::DELETE, "/v1/tenants/acme/sessions/5511", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["had_thread"], false);
}

#[tokio::test]
async fn unknown_tenant_is_not_found() {
    let h = harness(None, None);
    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/tenants/globex/assignments",
        Some(json!({ "contact_id": "5511" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("globex"));
}

// ── Scheduled messages ──────────────────────────────────────────────

#[tokio::test]
async fn scheduled_message_lifecycle_preserves_offsets() {
    let h = harness(None, None);
    let base = Utc.with_ymd_and_hms(2026, 6, 2, 12, 0, 0).unwrap().timestamp();

    let mut ids = Vec::new();
    for (i, hours) in [0i64, 24].iter().enumerate() {
        let (status, body) = call(
            &h.app,
            Method::POST,
            "/v1/tenants/acme/scheduled-messages",
            Some(json!({
                "chatIds": ["5511"],
                "message": format!("follow-up {i}"),
                "scheduledTime": { "seconds": base + hours * 3600, "nanoseconds": 0 },
                "type": "drip",
                "metadata": { "step": i }
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "scheduled");
        ids.push(body["id"].as_str().unwrap().to_owned());
    }

    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/tenants/acme/scheduled-messages/pause",
        Some(json!({ "chatId": "5511", "type": "drip" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["paused"], 2);

    h.clock.advance(chrono::Duration::hours(48));
    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/tenants/acme/scheduled-messages/resume",
        Some(json!({ "chatId": "5511" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["delta_seconds"], 48 * 3600);

    let (_, first) = call(
        &h.app,
        Method::GET,
        &format!("/v1/tenants/acme/scheduled-messages/{}", ids[0]),
        None,
    )
    .await;
    let (_, second) = call(
        &h.app,
        Method::GET,
        &format!("/v1/tenants/acme/scheduled-messages/{}", ids[1]),
        None,
    )
    .await;
    let gap = second["scheduledTime"]["seconds"].as_i64().unwrap()
        - first["scheduledTime"]["seconds"].as_i64().unwrap();
    assert_eq!(gap, 24 * 3600);
    assert_eq!(first["status"], "scheduled");

    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/tenants/acme/scheduled-messages/cleanup",
        Some(json!({ "contactId": "5511", "type": "drip", "step": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (status, _) = call(
        &h.app,
        Method::DELETE,
        &format!("/v1/tenants/acme/scheduled-messages/{}", ids[0]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = call(
        &h.app,
        Method::DELETE,
        &format!("/v1/tenants/acme/scheduled-messages/{}", ids[0]),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_payloads_are_bad_requests() {
    let h = harness(None, None);
    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/tenants/acme/scheduled-messages",
        Some(json!({
            "chatIds": [],
            "message": "hi",
            "scheduledTime": { "seconds": 1, "nanoseconds": 0 }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "validation");

    let (status, _) = call(
        &h.app,
        Method::POST,
        "/v1/tenants/acme/scheduled-messages/pause",
        Some(json!({ "chatId": " " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ── Assignment ──────────────────────────────────────────────────────

#[tokio::test]
async fn assignment_uses_the_refreshed_roster() {
    let h = harness(None, None);

    let (status, body) = call(
        &h.app,
        Method::POST,
        "/v1/tenants/acme/assignments",
        Some(json!({ "contact_id": "5511", "event": "lead_created" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["manager"]["name"], "maria");
    assert_eq!(body["assignee"]["name"], "sam");

    let (status, body) = call(
        &h.app,
        Method::PUT,
        "/v1/tenants/acme/roster",
        Some(json!({ "staff": [
            { "name": "maria", "phone": "maria-phone", "role": "manager" },
            { "name": "sam", "phone": "sam-phone", "role": "sales", "weight": 0 },
            { "name": "lia", "phone": "lia-phone", "role": "sales", "weight": 2 }
        ] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["active"], 2);

    let (_, body) = call(
        &h.app,
        Method::POST,
        "/v1/tenants/acme/assignments",
        Some(json!({ "contact_id": "5512" })),
    )
    .await;
    assert_eq!(body["assignee"]["name"], "lia");
    let contact = h.state.contacts.get("acme", "5512").unwrap().unwrap();
    assert_eq!(contact.assigned_to.as_deref(), Some("lia"));
    assert!(!h.transport.texts_to("lia-phone").is_empty());
}

// ── Inbound → turn ──────────────────────────────────────────────────

#[tokio::test]
async fn inbound_signature_is_enforced() {
    let h = harness(Some(TOKEN), Some(SECRET));
    let body = json!({ "chatId": "5511", "body": "hello" });

    let resp = h
        .app
        .clone()
        .oneshot(signed_inbound(&body, "00ff"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.state.debouncer.pending_count(), 0);

    let good = sign(SECRET, body.to_string().as_bytes()).unwrap();
    let resp = h.app.clone().oneshot(signed_inbound(&body, &good)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::ACCEPTED);
    assert_eq!(h.state.debouncer.pending_count(), 1);
}

#[tokio::test]
async fn malformed_inbound_is_rejected() {
    let h = harness(None, None);
    let resp = h
        .app
        .clone()
        .oneshot(
            Request::post("/v1/tenants/acme/inbound")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn burst_becomes_one_turn_and_reset_clears_the_thread() {
    let h = harness(None, None);
    h.assistant
        .push_run(vec![Step::Working(1), Step::Reply("See you tomorrow at 10.".into())]);

    for text in ["hi", "can I book", "tomorrow?"] {
        let (status, body) = call(
            &h.app,
            Method::POST,
            "/v1/tenants/acme/inbound",
            Some(json!({ "chatId": "5511", "body": text })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "buffered");
        tokio::time::sleep(Duration::from_secs(2)).await;
    }

    tokio::time::sleep(Duration::from_secs(30)).await;

    assert_eq!(h.assistant.threads_created(), 1);
    assert_eq!(h.assistant.runs_created(), 1);
    assert_eq!(
        h.transport.texts_to("5511"),
        vec!["See you tomorrow at 10.".to_owned()]
    );

    let (status, body) = call(&h.app, Method::DELETE, "/v1/tenants/acme/sessions/5511", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["had_thread"], true);
}
