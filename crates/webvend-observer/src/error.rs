//! Error types for the API layer.
//!
//! [`ObserverError`] unifies all failure modes into a single enum that
//! converts into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. The body is
//! always `{"error": <message>, "status": <code>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::warn;
use webvend_core::{SchedulerError, StoreError};
use webvend_relay::RelayError;

/// Errors that can occur in the API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// An invalid query parameter or path segment was provided.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// The request is well formed but cannot be served as asked.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request conflicts with the current run state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The model provider failed or answered with something unusable.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The model provider did not answer in time.
    #[error("upstream timeout: {0}")]
    Timeout(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ObserverError {
    /// The HTTP status this error maps to.
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidQuery(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match self {
            Self::NotFound(msg)
            | Self::InvalidQuery(msg)
            | Self::BadRequest(msg)
            | Self::Conflict(msg)
            | Self::Upstream(msg)
            | Self::Timeout(msg)
            | Self::Internal(msg) => msg,
        };
        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %message, "request failed");
        }

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

impl From<SchedulerError> for ObserverError {
    fn from(err: SchedulerError) -> Self {
        let message = err.to_string();
        match err {
            SchedulerError::UnknownRun(_) => Self::NotFound(message),
            SchedulerError::AlreadyActive(_)
            | SchedulerError::NoRun
            | SchedulerError::RunNotActive { .. }
            | SchedulerError::StaleStep { .. } => Self::Conflict(message),
            SchedulerError::UpstreamTimeout(_) => Self::Timeout(message),
            SchedulerError::TransientNetwork(_) | SchedulerError::MalformedPayload(_) => {
                Self::Upstream(message)
            }
            SchedulerError::Prompt(_) | SchedulerError::Internal(_) => Self::Internal(message),
        }
    }
}

impl From<StoreError> for ObserverError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::UnknownProduct(_) => Self::NotFound(message),
            StoreError::OutOfStock(_) => Self::BadRequest(message),
        }
    }
}

impl From<RelayError> for ObserverError {
    fn from(err: RelayError) -> Self {
        let message = err.to_string();
        match err {
            RelayError::Config(_) => Self::Internal(message),
            RelayError::UpstreamConnect(_)
            | RelayError::UpstreamStatus { .. }
            | RelayError::Interrupted(_)
            | RelayError::Decode(_) => Self::Upstream(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use webvend_types::{RunId, RunStatus};

    use super::*;

    #[test]
    fn scheduler_errors_map_to_http_statuses() {
        let run_id = RunId::new();
        let cases = [
            (SchedulerError::UnknownRun(run_id), StatusCode::NOT_FOUND),
            (SchedulerError::AlreadyActive(run_id), StatusCode::CONFLICT),
            (
                SchedulerError::RunNotActive {
                    run_id,
                    status: RunStatus::Paused,
                },
                StatusCode::CONFLICT,
            ),
            (
                SchedulerError::StaleStep {
                    current: 3,
                    requested: 2,
                },
                StatusCode::CONFLICT,
            ),
            (SchedulerError::UpstreamTimeout(30_000), StatusCode::GATEWAY_TIMEOUT),
            (
                SchedulerError::TransientNetwork("reset".to_owned()),
                StatusCode::BAD_GATEWAY,
            ),
            (
                SchedulerError::Internal("oops".to_owned()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(ObserverError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn purchase_errors_distinguish_missing_from_empty() {
        assert_eq!(
            ObserverError::from(StoreError::UnknownProduct("Caviar".to_owned())).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ObserverError::from(StoreError::OutOfStock("Gum".to_owned())).status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
