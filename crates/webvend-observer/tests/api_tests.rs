//! Integration tests for the API endpoints.
//!
//! Most tests drive the Axum `Router` directly via `tower::ServiceExt`
//! without starting a TCP server; the live sync and lifecycle tests bind an
//! ephemeral port. Decisions come from a scripted stub; the relay
//! either points at a fake provider on an ephemeral port or at an address
//! nothing listens on.

#![allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use axum::routing::{get, post};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tower::ServiceExt;
use webvend_core::config::{CatalogEntry, default_catalog};
use webvend_core::decision::DecisionError;
use webvend_core::{PromptEngine, SchedulerSettings, SimulationStore, StepScheduler, StubDecisionSource};
use webvend_observer::router::build_router;
use webvend_observer::server::{ServerConfig, ServerError, bind, serve};
use webvend_observer::state::AppState;
use webvend_relay::{BackendType, InferenceRelay, RelayConfig};

/// Ticks never fire on their own within a test.
const HOUR: Duration = Duration::from_secs(3600);

const BUY_COLA: &str = "Action: BUY, Item: 'Classic Cola', Quantity: 10";

fn settings(step_timeout: Duration) -> SchedulerSettings {
    SchedulerSettings {
        tick_interval: HOUR,
        step_timeout,
        purchase_probability: 0.0,
        recent_history: 5,
        agent_name: "VendingMachine".to_owned(),
        catalog: default_catalog(),
        seed: Some(7),
    }
}

fn state_with(source: StubDecisionSource, step_timeout: Duration, relay_url: &str) -> Arc<AppState> {
    let settings = settings(step_timeout);
    let seed = settings.catalog.iter().map(CatalogEntry::to_item).collect();
    let store = Arc::new(SimulationStore::new(seed, Decimal::ONE_HUNDRED));
    let scheduler = Arc::new(StepScheduler::new(
        Arc::new(source),
        store,
        PromptEngine::new().unwrap(),
        settings,
    ));
    let relay = Arc::new(InferenceRelay::new(RelayConfig::new(
        BackendType::OpenAi,
        relay_url,
        "test-key",
        "test-model",
    )));
    Arc::new(AppState::new(scheduler, relay))
}

/// Port 9 (discard) on loopback: connections are refused.
const DEAD_UPSTREAM: &str = "http://127.0.0.1:9";

fn make_test_state(source: StubDecisionSource) -> Arc<AppState> {
    state_with(source, HOUR, DEAD_UPSTREAM)
}

async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_to_string(body: Body) -> String {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Body) {
    let response = build_router(Arc::clone(state)).oneshot(request).await.unwrap();
    (response.status(), response.into_body())
}

async fn get_json(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(state, Request::get(uri).body(Body::empty()).unwrap()).await;
    (status, body_to_json(body).await)
}

async fn post_json(state: &Arc<AppState>, uri: &str, payload: &Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    let (status, body) = send(state, request).await;
    (status, body_to_json(body).await)
}

async fn post_empty(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(state, Request::post(uri).body(Body::empty()).unwrap()).await;
    (status, body_to_json(body).await)
}

// =========================================================================
// Simulation control
// =========================================================================

#[tokio::test]
async fn start_returns_run_and_second_start_conflicts() {
    let state = make_test_state(StubDecisionSource::default());

    let (status, run) = post_json(&state, "/api/simulation/start", &json!({"model_id": "m-1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "active");
    assert_eq!(run["step_number"], 0);
    assert!(run["run_id"].is_string());

    let (status, err) = post_empty(&state, "/api/simulation/start").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["status"], 409);
    assert!(err["error"].as_str().unwrap().contains("already active"));
}

#[tokio::test]
async fn start_without_body_uses_default_model() {
    let state = make_test_state(StubDecisionSource::default());
    let (status, _) = post_empty(&state, "/api/simulation/start").await;
    assert_eq!(status, StatusCode::OK);

    let (_, current) = get_json(&state, "/api/simulation/status").await;
    assert_eq!(current["status"], "active");
    assert_eq!(current["run"]["model_id"], "test-model");
}

#[tokio::test]
async fn manual_step_applies_action_and_moves_cash() {
    let state = make_test_state(StubDecisionSource::new(BUY_COLA));
    let (_, run) = post_empty(&state, "/api/simulation/start").await;
    let run_id = run["run_id"].as_str().unwrap();

    let (status, step) = post_empty(
        &state,
        &format!("/api/simulation/step?run_id={run_id}&step_number=0"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(step["applied"], true);
    assert_eq!(step["step_number"], 1);
    assert_eq!(step["action"]["action"], "BUY");
    assert_eq!(step["action"]["item_name"], "Classic Cola");

    let (_, balance) = get_json(&state, "/api/vending/balance").await;
    assert_eq!(balance["balance"], 95.0);

    let (_, inventory) = get_json(&state, "/api/vending/inventory").await;
    let cola = inventory["inventory"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["product_name"] == "Classic Cola")
        .unwrap();
    assert_eq!(cola["quantity_in_stock"], 20);
}

#[tokio::test]
async fn step_rejects_stale_unknown_and_malformed_runs() {
    let state = make_test_state(StubDecisionSource::default());

    let (status, _) = post_empty(&state, "/api/simulation/step").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, run) = post_empty(&state, "/api/simulation/start").await;
    let run_id = run["run_id"].as_str().unwrap();

    let (status, _) = post_empty(
        &state,
        &format!("/api/simulation/step?run_id={run_id}&step_number=4"),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let other = uuid::Uuid::now_v7();
    let (status, _) = post_empty(&state, &format!("/api/simulation/step?run_id={other}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = post_empty(&state, "/api/simulation/step?run_id=not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn step_maps_upstream_failures_to_gateway_errors() {
    let source = StubDecisionSource::default()
        .with_script(vec![Err(DecisionError::Network("connection reset".to_owned()))]);
    let state = make_test_state(source);
    post_empty(&state, "/api/simulation/start").await;

    let (status, err) = post_empty(&state, "/api/simulation/step").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(err["status"], 502);

    let (_, current) = get_json(&state, "/api/simulation/status").await;
    assert_eq!(current["status"], "error");

    // A failed run resumes with an explicit start.
    let (status, run) = post_empty(&state, "/api/simulation/start").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "active");
}

#[tokio::test]
async fn slow_decision_times_out_with_504() {
    let source = StubDecisionSource::default().with_delay(Duration::from_secs(30));
    let state = state_with(source, Duration::from_millis(50), DEAD_UPSTREAM);
    post_empty(&state, "/api/simulation/start").await;

    let (status, err) = post_empty(&state, "/api/simulation/step").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(err["status"], 504);
}

#[tokio::test]
async fn pause_then_pause_again_conflicts() {
    let state = make_test_state(StubDecisionSource::default());

    let (status, _) = post_empty(&state, "/api/simulation/pause").await;
    assert_eq!(status, StatusCode::CONFLICT);

    post_empty(&state, "/api/simulation/start").await;
    let (status, run) = post_empty(&state, "/api/simulation/pause").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["status"], "paused");

    let (status, _) = post_empty(&state, "/api/simulation/pause").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = post_empty(&state, "/api/simulation/step").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn logs_are_returned_in_step_order() {
    let state = make_test_state(StubDecisionSource::new(BUY_COLA));
    let (_, run) = post_empty(&state, "/api/simulation/start").await;
    let run_id = run["run_id"].as_str().unwrap().to_owned();
    post_empty(&state, "/api/simulation/step").await;
    post_empty(&state, "/api/simulation/step").await;

    let (status, body) = get_json(&state, &format!("/api/simulation/logs/{run_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["run_id"], run_id.as_str());
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 2);
    assert_eq!(logs[0]["step_number"], 1);
    assert_eq!(logs[1]["step_number"], 2);
    assert_eq!(logs[0]["agent_name"], "VendingMachine");
    assert_eq!(logs[0]["response"], BUY_COLA);
    assert!(logs[0]["prompt"].as_str().unwrap().contains("Classic Cola"));
    assert_eq!(logs[0]["parsed_action"]["action"]["action"], "BUY");

    let (status, _) = get_json(&state, "/api/simulation/logs/42").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_clears_store_and_run() {
    let state = make_test_state(StubDecisionSource::new(BUY_COLA));
    post_empty(&state, "/api/simulation/start").await;
    post_empty(&state, "/api/simulation/step").await;

    let (status, receipt) = post_empty(&state, "/api/simulation/reset").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["cleared_events"], 1);
    assert_eq!(receipt["cleared_logs"], 1);

    let (_, balance) = get_json(&state, "/api/vending/balance").await;
    assert_eq!(balance["balance"], 100.0);
    let (_, current) = get_json(&state, "/api/simulation/status").await;
    assert_eq!(current["status"], "idle");
    assert!(current["run"].is_null());
}

// =========================================================================
// Vending
// =========================================================================

#[tokio::test]
async fn purchase_sells_one_unit_at_retail() {
    let state = make_test_state(StubDecisionSource::default());

    let (status, body) = post_json(&state, "/api/vending/purchase", &json!({"item": "Gum"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["item"]["quantity_in_stock"], 9);

    let (_, transactions) = get_json(&state, "/api/vending/transactions").await;
    let list = transactions["transactions"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["action"], "sold_to_customer");
    assert_eq!(list[0]["agent_name"], "Customer");
    assert_eq!(list[0]["price"], 0.75);

    let (_, ledger) = get_json(&state, "/api/vending/ledger").await;
    assert_eq!(ledger["revenue"], 0.75);
    assert_eq!(ledger["profit_margin"], 100.0);
}

#[tokio::test]
async fn purchase_errors() {
    let state = make_test_state(StubDecisionSource::default());

    let (status, err) = post_json(&state, "/api/vending/purchase", &json!({"item": "Caviar"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["status"], 404);

    for _ in 0..10 {
        let (status, _) = post_json(&state, "/api/vending/purchase", &json!({"item": "Gum"})).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, err) = post_json(&state, "/api/vending/purchase", &json!({"item": "Gum"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("out of stock"));
}

#[tokio::test]
async fn transactions_are_newest_first_and_limited() {
    let state = make_test_state(StubDecisionSource::default());
    for item in ["Gum", "Pretzels", "Diet Cola"] {
        post_json(&state, "/api/vending/purchase", &json!({ "item": item })).await;
    }

    let (status, body) = get_json(&state, "/api/vending/transactions?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let list = body["transactions"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["product"], "Diet Cola");
    assert_eq!(list[1]["product"], "Pretzels");

    let (status, _) = get_json(&state, "/api/vending/transactions?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn metrics_include_performance_and_stock_value() {
    let state = make_test_state(StubDecisionSource::default());
    post_json(&state, "/api/vending/purchase", &json!({"item": "Gum"})).await;

    let (status, body) = get_json(&state, "/api/vending/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["performance"].is_object());
    assert!(body["inventory_value"].is_object());
}

// =========================================================================
// Webhook
// =========================================================================

#[tokio::test]
async fn webhook_always_persists_one_event() {
    let state = make_test_state(StubDecisionSource::default());

    let envelope = json!({
        "record": {
            "message": "{\"type\":\"sold_to_customer\",\"payload\":{\"product\":\"Gum\",\"amount\":0.75}}"
        }
    });
    for body in [envelope.to_string(), "definitely not json".to_owned()] {
        let request = Request::post("/api/webhook/events")
            .body(Body::from(body))
            .unwrap();
        let (status, body) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body_to_string(body).await, "OK");
    }

    assert_eq!(state.store.events().await.len(), 2);
    let (_, transactions) = get_json(&state, "/api/vending/transactions").await;
    let list = transactions["transactions"].as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["product"], "Gum");
}

// =========================================================================
// Relay and models
// =========================================================================

#[tokio::test]
async fn relay_streams_upstream_text() {
    let body = [
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
        "data: [DONE]\n\n",
    ]
    .concat();
    let url = spawn_upstream(Router::new().route(
        "/chat/completions",
        post(move || {
            let body = body.clone();
            async move { body }
        }),
    ))
    .await;
    let state = state_with(StubDecisionSource::default(), HOUR, &url);

    let request = Request::post("/api/relay")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({"query": "hi"}).to_string()))
        .unwrap();
    let response = build_router(Arc::clone(&state)).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "no-cache, no-transform"
    );
    assert_eq!(response.headers()[header::CONNECTION], "keep-alive");
    assert_eq!(response.headers()["x-accel-buffering"], "no");
    assert_eq!(body_to_string(response.into_body()).await, "Hello");
}

#[tokio::test]
async fn relay_unreachable_upstream_is_bad_gateway() {
    let state = make_test_state(StubDecisionSource::default());
    let (status, err) = post_json(&state, "/api/relay", &json!({"query": "hi"})).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(err["status"], 502);

    let (status, _) = post_json(&state, "/api/relay", &json!({"query": "  "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn models_pass_through() {
    let url = spawn_upstream(Router::new().route(
        "/models",
        get(|| async { axum::Json(json!({"data": [{"id": "test-model"}]})) }),
    ))
    .await;
    let state = state_with(StubDecisionSource::default(), HOUR, &url);

    let (status, body) = get_json(&state, "/api/models").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["id"], "test-model");
}

// =========================================================================
// Live sync and server lifecycle (real sockets)
// =========================================================================

const FRAME_WAIT: Duration = Duration::from_secs(5);

async fn spawn_api(
    state: &Arc<AppState>,
) -> (
    std::net::SocketAddr,
    tokio::sync::oneshot::Sender<()>,
    tokio::task::JoinHandle<Result<(), ServerError>>,
) {
    let config = ServerConfig {
        host: "127.0.0.1".to_owned(),
        port: 0,
    };
    let listener = bind(&config).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(serve(listener, Arc::clone(state), async move {
        let _ = stopped.await;
    }));
    (addr, stop, handle)
}

/// Send a `WebSocket` upgrade request and return the response status line.
async fn open_ws(addr: std::net::SocketAddr, path: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!(
        "GET {path} HTTP/1.1\r\n\
         Host: {addr}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    );
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        head.push(stream.read_u8().await.unwrap());
    }
    let head = String::from_utf8(head).unwrap();
    let status_line = head.lines().next().unwrap().to_owned();
    (stream, status_line)
}

/// Read one unmasked server text frame and decode its JSON payload.
async fn read_frame(stream: &mut TcpStream) -> Value {
    let read = async {
        let opcode = stream.read_u8().await.unwrap();
        assert_eq!(opcode, 0x81, "expected a final text frame");
        let len = match stream.read_u8().await.unwrap() {
            126 => usize::from(stream.read_u16().await.unwrap()),
            127 => usize::try_from(stream.read_u64().await.unwrap()).unwrap(),
            short => usize::from(short),
        };
        let mut payload = vec![0_u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        serde_json::from_slice(&payload).unwrap()
    };
    tokio::time::timeout(FRAME_WAIT, read).await.unwrap()
}

fn stock_of(frame: &Value, product: &str) -> Value {
    frame["data"]["inventory"]
        .as_array()
        .unwrap()
        .iter()
        .find(|i| i["product_name"] == product)
        .unwrap()["quantity_in_stock"]
        .clone()
}

#[tokio::test]
async fn ws_sync_unknown_resource_is_not_found() {
    let state = make_test_state(StubDecisionSource::default());
    let (addr, _stop, _server) = spawn_api(&state).await;

    let (_, status_line) = open_ws(addr, "/ws/sync/balance").await;
    assert!(status_line.starts_with("HTTP/1.1 404"), "{status_line}");
}

#[tokio::test]
async fn ws_sync_sends_full_view_then_changes() {
    let state = make_test_state(StubDecisionSource::default());
    let (addr, _stop, _server) = spawn_api(&state).await;

    let (mut stream, status_line) = open_ws(addr, "/ws/sync/inventory").await;
    assert!(status_line.starts_with("HTTP/1.1 101"), "{status_line}");

    let first = read_frame(&mut stream).await;
    assert_eq!(first["resource"], "inventory");
    assert_eq!(first["reason"], "initial");
    assert_eq!(first["data"]["inventory"].as_array().unwrap().len(), 9);
    assert_eq!(stock_of(&first, "Classic Cola"), 10);

    state.store.record_sale("Classic Cola").await.unwrap();

    let second = read_frame(&mut stream).await;
    assert_eq!(second["reason"], "change");
    assert_eq!(stock_of(&second, "Classic Cola"), 9);
    assert!(second["sequence"].as_u64() > first["sequence"].as_u64());
    assert!(second["version"].as_u64() > first["version"].as_u64());
}

#[tokio::test]
async fn shutdown_drains_and_pauses_the_active_run() {
    let state = make_test_state(StubDecisionSource::default());
    let (_, run) = post_empty(&state, "/api/simulation/start").await;
    assert_eq!(run["status"], "active");

    let (_, stop, server) = spawn_api(&state).await;
    stop.send(()).unwrap();
    let result = tokio::time::timeout(FRAME_WAIT, server).await.unwrap().unwrap();
    assert!(result.is_ok());

    let (_, current) = get_json(&state, "/api/simulation/status").await;
    assert_eq!(current["status"], "paused");
}

#[tokio::test]
async fn bind_rejects_a_malformed_host() {
    let config = ServerConfig {
        host: "not a host".to_owned(),
        port: 0,
    };
    assert!(matches!(bind(&config).await, Err(ServerError::Bind(_))));
}
