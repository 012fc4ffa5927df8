//! The decision seam between the scheduler and an inference provider.
//!
//! The scheduler only knows [`DecisionSource`]: give it a model and a
//! rendered prompt, get back raw text. Production wires in the
//! [`InferenceRelay`]; tests wire in [`StubDecisionSource`].

use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;
use webvend_relay::{InferenceRelay, RelayError};

/// Why a decision could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecisionError {
    /// The provider was unreachable, refused, or broke off mid-answer.
    #[error("network failure: {0}")]
    Network(String),

    /// The provider answered, but with nothing usable.
    #[error("malformed decision: {0}")]
    Malformed(String),

    /// A local fault unrelated to the provider.
    #[error("internal decision error: {0}")]
    Internal(String),
}

impl From<RelayError> for DecisionError {
    fn from(err: RelayError) -> Self {
        match err {
            RelayError::UpstreamConnect(_)
            | RelayError::UpstreamStatus { .. }
            | RelayError::Interrupted(_) => Self::Network(err.to_string()),
            RelayError::Decode(msg) => Self::Malformed(msg),
            RelayError::Config(msg) => Self::Internal(msg),
        }
    }
}

/// Something that turns a prompt into a decision.
pub trait DecisionSource: Send + Sync {
    /// Ask `model` to answer `prompt`. Returns the full raw response text.
    fn decide<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, DecisionError>>;
}

impl DecisionSource for InferenceRelay {
    fn decide<'a>(
        &'a self,
        model: &'a str,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, DecisionError>> {
        Box::pin(async move { Ok(self.complete(model, prompt).await?) })
    }
}

// ---------------------------------------------------------------------------
// Stub
// ---------------------------------------------------------------------------

/// Scripted decision source for tests and offline runs.
///
/// Replays queued results in order, then falls back to a fixed response.
/// An optional delay simulates a slow provider.
#[derive(Debug)]
pub struct StubDecisionSource {
    script: Mutex<Vec<Result<String, DecisionError>>>,
    fallback: String,
    delay: Option<Duration>,
}

impl Default for StubDecisionSource {
    fn default() -> Self {
        Self::new("Action: DO_NOTHING")
    }
}

impl StubDecisionSource {
    /// A source that always answers `fallback`.
    pub fn new(fallback: &str) -> Self {
        Self {
            script: Mutex::new(Vec::new()),
            fallback: fallback.to_owned(),
            delay: None,
        }
    }

    /// Queue results to be returned before the fallback.
    #[must_use]
    pub fn with_script(self, results: Vec<Result<String, DecisionError>>) -> Self {
        let mut reversed = results;
        reversed.reverse();
        Self {
            script: Mutex::new(reversed),
            ..self
        }
    }

    /// Sleep this long before every answer.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn next_result(&self) -> Result<String, DecisionError> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| DecisionError::Internal("stub script lock poisoned".to_owned()))?;
        script.pop().unwrap_or_else(|| Ok(self.fallback.clone()))
    }
}

impl DecisionSource for StubDecisionSource {
    fn decide<'a>(
        &'a self,
        _model: &'a str,
        _prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, DecisionError>> {
        Box::pin(async move {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.next_result()
        })
    }
}
