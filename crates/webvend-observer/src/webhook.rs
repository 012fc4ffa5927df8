//! `POST /api/webhook/events`: ingest one external event per call.
//!
//! The body is read raw so that anything a producer sends, JSON or not,
//! still lands in the log. See [`webvend_core::webhook`] for how envelopes
//! are read.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::response::IntoResponse;
use tracing::info;
use webvend_core::webhook::{acknowledgement, parse_envelope};

use crate::state::AppState;

/// Persist the posted event and answer `OK`.
pub async fn receive(State(state): State<Arc<AppState>>, body: Bytes) -> impl IntoResponse {
    let kind = parse_envelope(&body);
    let event = state.store.ingest(kind, None, acknowledgement()).await;
    info!(event_id = %event.id, event_type = event.kind.type_name(), "webhook event received");
    "OK"
}
