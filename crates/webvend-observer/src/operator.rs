//! Simulation control endpoints.
//!
//! These drive the [`StepScheduler`](webvend_core::StepScheduler): start or
//! resume a run, step it by hand, pause it, reset everything, and read the
//! per-step decision logs.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/simulation/start` | Start or resume a run |
//! | `POST` | `/api/simulation/step` | Apply one step to a run |
//! | `POST` | `/api/simulation/pause` | Pause the active run |
//! | `POST` | `/api/simulation/reset` | Drop the run and clear the store |
//! | `GET` | `/api/simulation/status` | Scheduler status |
//! | `GET` | `/api/simulation/logs/{run_id}` | Step logs for a run |

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;
use webvend_core::TickOutcome;
use webvend_types::{AgentAction, RunId, RunStatus, StepLog};

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/simulation/start`.
#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    /// Model to ask. Defaults to the configured model.
    pub model_id: Option<String>,
}

/// Response body for start and pause.
#[derive(Debug, Serialize)]
pub struct RunResponse {
    /// The run.
    pub run_id: RunId,
    /// Its status after the call.
    pub status: RunStatus,
    /// Its current step number.
    pub step_number: u64,
}

/// Query parameters for `POST /api/simulation/step`.
#[derive(Debug, Deserialize)]
pub struct StepQuery {
    /// Run to step. Defaults to the current run.
    pub run_id: Option<String>,
    /// Expected current step number; a mismatch is rejected as stale.
    pub step_number: Option<u64>,
}

/// Response body for `POST /api/simulation/step`.
#[derive(Debug, Serialize)]
pub struct StepResponse {
    /// Whether this call committed a step.
    pub applied: bool,
    /// The run.
    pub run_id: Option<RunId>,
    /// The run's step number after the call.
    pub step_number: u64,
    /// The action taken, when a step was committed.
    pub action: Option<AgentAction>,
    /// Why the action was rejected, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,
}

/// Response body for `GET /api/simulation/logs/{run_id}`.
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    /// The run.
    pub run_id: RunId,
    /// Its step logs in step order.
    pub logs: Vec<StepLog>,
}

fn parse_run_id(raw: &str) -> Result<RunId, ObserverError> {
    Uuid::parse_str(raw)
        .map(RunId::from)
        .map_err(|e| ObserverError::InvalidQuery(format!("invalid run id '{raw}': {e}")))
}

// ---------------------------------------------------------------------------
// POST /api/simulation/start
// ---------------------------------------------------------------------------

/// Start a new run, or resume a paused or failed one.
///
/// The body is optional. Returns 409 if a run is already active.
pub async fn start(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<impl IntoResponse, ObserverError> {
    let request: StartRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ObserverError::BadRequest(format!("invalid start request: {e}")))?
    };
    let model_id = request
        .model_id
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.default_model.clone());

    let run = state.scheduler.start(&model_id).await?;

    Ok(Json(RunResponse {
        run_id: run.run_id,
        status: run.status,
        step_number: run.step_number,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/simulation/step
// ---------------------------------------------------------------------------

/// Apply one step.
///
/// A step that lost the race to an in-flight tick answers 200 with
/// `applied: false`.
pub async fn step(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StepQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    let outcome = match query.run_id.as_deref() {
        Some(raw) => {
            let run_id = parse_run_id(raw)?;
            state.scheduler.step(run_id, query.step_number).await?
        }
        None => state.scheduler.tick().await?,
    };

    let response = match outcome {
        TickOutcome::Applied(report) => StepResponse {
            applied: true,
            run_id: Some(report.run_id),
            step_number: report.step_number,
            action: Some(report.action),
            rejection: report.rejection,
        },
        TickOutcome::Suppressed | TickOutcome::Discarded => {
            let run = state.scheduler.status().await.run;
            StepResponse {
                applied: false,
                run_id: run.as_ref().map(|r| r.run_id),
                step_number: run.map_or(0, |r| r.step_number),
                action: None,
                rejection: None,
            }
        }
    };
    Ok(Json(response))
}

// ---------------------------------------------------------------------------
// POST /api/simulation/pause
// ---------------------------------------------------------------------------

/// Pause the active run. Returns 409 when nothing is active.
pub async fn pause(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    let run = state.scheduler.pause().await?;
    Ok(Json(RunResponse {
        run_id: run.run_id,
        status: run.status,
        step_number: run.step_number,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/simulation/reset
// ---------------------------------------------------------------------------

/// Drop the run and clear the store. Answers after the clear is done.
pub async fn reset(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let receipt = state.scheduler.reset().await;
    info!(
        cleared_events = receipt.cleared_events,
        cleared_logs = receipt.cleared_logs,
        "simulation reset via API"
    );
    Json(receipt)
}

// ---------------------------------------------------------------------------
// GET /api/simulation/status
// ---------------------------------------------------------------------------

/// Current scheduler status.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.scheduler.status().await)
}

// ---------------------------------------------------------------------------
// GET /api/simulation/logs/{run_id}
// ---------------------------------------------------------------------------

/// Step logs for a run in step order. An unknown run has no logs.
pub async fn logs(
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> Result<impl IntoResponse, ObserverError> {
    let run_id = parse_run_id(&run_id)?;
    let logs = state.store.logs(run_id).await;
    Ok(Json(LogsResponse { run_id, logs }))
}
