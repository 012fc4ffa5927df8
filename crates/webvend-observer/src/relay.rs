//! `POST /api/relay`: stream model output to the caller as it arrives.
//!
//! The upstream connection is opened before any response bytes go out, so a
//! provider that cannot be reached is a plain 502. Once streaming has begun
//! the status is already 200; a later upstream failure just ends the body
//! early with every chunk sent so far intact.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};
use webvend_relay::TokenStream;

use crate::error::ObserverError;
use crate::state::AppState;

/// Request body for `POST /api/relay`.
#[derive(Debug, Deserialize)]
pub struct RelayRequest {
    /// The prompt to forward.
    pub query: String,
    /// Model override. Defaults to the relay's configured model.
    pub model: Option<String>,
}

/// Relay `query` upstream and stream the text back.
pub async fn relay(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RelayRequest>,
) -> Result<Response, ObserverError> {
    if body.query.trim().is_empty() {
        return Err(ObserverError::BadRequest("query must not be empty".to_owned()));
    }
    let tokens = match body.model.as_deref() {
        Some(model) => state.relay.relay_model(model, &body.query).await?,
        None => state.relay.relay(&body.query).await?,
    };

    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
            (header::HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        Body::from_stream(chunks(tokens)),
    )
        .into_response())
}

/// Forward chunks as they arrive and log how the stream ended.
fn chunks(tokens: TokenStream) -> impl futures::Stream<Item = Result<String, Infallible>> {
    futures::stream::unfold(Some(tokens), |tokens| async move {
        let mut tokens = tokens?;
        match tokens.next().await {
            Some(chunk) => Some((Ok(chunk), Some(tokens))),
            None => {
                match tokens.take_interruption() {
                    Some(e) => warn!(error = %e, "relay stream interrupted"),
                    None => debug!("relay stream completed"),
                }
                None
            }
        }
    })
}
