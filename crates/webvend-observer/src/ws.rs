//! `WebSocket` handler for live resource views.
//!
//! Clients connect to `GET /ws/sync/{resource}` where the resource is
//! `inventory`, `ledger`, or `transactions`. The first frame is the full
//! current view; after that a new full view is sent each time the resource
//! changes. Each frame is a JSON-encoded [`SyncUpdate`](webvend_core::SyncUpdate).

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::StreamExt;
use tracing::{debug, warn};
use webvend_types::SyncResource;

use crate::error::ObserverError;
use crate::state::AppState;

/// Upgrade to a `WebSocket` and begin streaming `resource` updates.
///
/// # Route
///
/// `GET /ws/sync/{resource}`
pub async fn ws_sync(
    ws: WebSocketUpgrade,
    Path(resource): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let resource = SyncResource::from_name(&resource)
        .ok_or_else(|| ObserverError::NotFound(format!("unknown sync resource: {resource}")))?;
    Ok(ws.on_upgrade(move |socket| handle_ws(socket, state, resource)))
}

/// Forward sync updates until either side goes away.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, resource: SyncResource) {
    debug!(?resource, "sync client connected");

    let mut updates = state.sync.subscribe(resource);

    loop {
        tokio::select! {
            update = updates.next() => {
                let Some(update) = update else {
                    debug!(?resource, "sync stream ended, closing socket");
                    return;
                };
                let json = match serde_json::to_string(&update) {
                    Ok(j) => j,
                    Err(e) => {
                        warn!("Failed to serialize sync update: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(json.into())).await.is_err() {
                    debug!("sync client disconnected (send failed)");
                    return;
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("sync client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("sync client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
