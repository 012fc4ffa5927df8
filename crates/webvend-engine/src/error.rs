//! Error types for the engine binary.
//!
//! [`EngineError`] covers every way startup can fail. `main` adds context
//! per stage on top of it.

/// Top-level error for the engine binary.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: webvend_core::ConfigError,
    },

    /// The prompt template could not be loaded.
    #[error("prompt error: {source}")]
    Prompt {
        /// The underlying prompt error.
        #[from]
        source: webvend_core::prompt::PromptError,
    },

    /// The tracing subscriber could not be installed.
    #[error("logging error: {message}")]
    Logging {
        /// Description of the failure.
        message: String,
    },

    /// The API server failed to bind or serve.
    #[error("server error: {source}")]
    Server {
        /// The underlying server error.
        #[from]
        source: webvend_observer::ServerError,
    },
}
