//! Axum router construction.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`] with
//! CORS enabled for the dashboard.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, operator, relay, webhook, ws};

/// Build the complete router.
///
/// The router includes:
/// - `POST /api/simulation/start` -- start or resume a run
/// - `POST /api/simulation/step` -- apply one step
/// - `POST /api/simulation/pause` -- pause the run
/// - `POST /api/simulation/reset` -- clear everything
/// - `GET /api/simulation/status` -- scheduler status
/// - `GET /api/simulation/logs/{run_id}` -- step logs
/// - `GET /api/vending/{inventory,balance,transactions,ledger,metrics}` -- reads
/// - `POST /api/vending/purchase` -- customer purchase
/// - `GET /api/models` -- provider model list
/// - `POST /api/relay` -- streaming relay
/// - `POST /api/webhook/events` -- external events
/// - `GET /ws/sync/{resource}` -- live views
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Simulation control
        .route("/api/simulation/start", post(operator::start))
        .route("/api/simulation/step", post(operator::step))
        .route("/api/simulation/pause", post(operator::pause))
        .route("/api/simulation/reset", post(operator::reset))
        .route("/api/simulation/status", get(operator::status))
        .route("/api/simulation/logs/{run_id}", get(operator::logs))
        // Vending
        .route("/api/vending/inventory", get(handlers::inventory))
        .route("/api/vending/balance", get(handlers::balance))
        .route("/api/vending/transactions", get(handlers::transactions))
        .route("/api/vending/ledger", get(handlers::ledger))
        .route("/api/vending/metrics", get(handlers::metrics))
        .route("/api/vending/purchase", post(handlers::purchase))
        // Models and relay
        .route("/api/models", get(handlers::models))
        .route("/api/relay", post(relay::relay))
        // Webhooks
        .route("/api/webhook/events", post(webhook::receive))
        // WebSocket
        .route("/ws/sync/{resource}", get(ws::ws_sync))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
