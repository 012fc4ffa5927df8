//! Error types for the inference relay.

/// Errors that can occur while relaying to a provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// The provider could not be reached. No stream was opened.
    #[error("upstream connect failed: {0}")]
    UpstreamConnect(String),

    /// The provider answered with a non-success status. No stream was opened.
    #[error("upstream returned {status}: {body}")]
    UpstreamStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, best effort.
        body: String,
    },

    /// The upstream failed after the stream was opened.
    ///
    /// Chunks forwarded before the failure remain delivered.
    #[error("upstream interrupted: {0}")]
    Interrupted(String),

    /// A non-streaming response could not be decoded.
    #[error("upstream response decode failed: {0}")]
    Decode(String),

    /// Configuration is invalid or missing.
    #[error("config error: {0}")]
    Config(String),
}

impl RelayError {
    /// Whether the failure happened before any stream existed.
    pub const fn is_connect_failure(&self) -> bool {
        matches!(self, Self::UpstreamConnect(_) | Self::UpstreamStatus { .. })
    }
}
