//! The streaming inference relay.
//!
//! [`InferenceRelay::relay`] opens one streaming request upstream and hands
//! back a [`TokenStream`] as soon as the provider has answered with a
//! success status. A spawned pump task decodes the SSE body and forwards
//! each text delta through a bounded channel the moment it is decoded.
//!
//! ```text
//! provider --bytes--> pump task --SseDecoder--> mpsc --> TokenStream
//! ```
//!
//! Dropping the [`TokenStream`] closes the channel. The pump notices via
//! `Sender::closed`, drops the response, and the upstream request is torn
//! down with it.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{BackendType, RelayConfig};
use crate::error::RelayError;
use crate::sse::{SseDecoder, SseFrame};

/// Chunks buffered between the pump and a slow consumer.
const CHANNEL_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Relay
// ---------------------------------------------------------------------------

/// A streaming proxy to one configured provider.
///
/// Cheap to share behind an `Arc`. Every call owns its own upstream request.
#[derive(Debug, Clone)]
pub struct InferenceRelay {
    client: reqwest::Client,
    config: RelayConfig,
}

impl InferenceRelay {
    /// Create a relay for `config`.
    pub fn new(config: RelayConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// The active configuration.
    pub const fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Relay `prompt` to the default model.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UpstreamConnect`] or
    /// [`RelayError::UpstreamStatus`] if the provider cannot be reached or
    /// refuses the request. In that case no stream is returned.
    pub async fn relay(&self, prompt: &str) -> Result<TokenStream, RelayError> {
        self.relay_model(&self.config.model, prompt).await
    }

    /// Relay `prompt` to a named model.
    ///
    /// # Errors
    ///
    /// See [`InferenceRelay::relay`].
    pub async fn relay_model(&self, model: &str, prompt: &str) -> Result<TokenStream, RelayError> {
        let response = self
            .stream_request(model, prompt)
            .send()
            .await
            .map_err(|e| {
                RelayError::UpstreamConnect(format!(
                    "{} request failed: {e}",
                    self.config.backend.name()
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            warn!(status = status.as_u16(), model, "upstream refused relay request");
            return Err(RelayError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        debug!(model, backend = self.config.backend.name(), "relay stream opened");
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        tokio::spawn(pump(response, self.config.backend, tx));
        Ok(TokenStream::new(rx))
    }

    /// Relay `prompt` and collect the whole answer.
    ///
    /// # Errors
    ///
    /// Fails like [`InferenceRelay::relay_model`], and with
    /// [`RelayError::Interrupted`] if the stream broke before completion.
    pub async fn complete(&self, model: &str, prompt: &str) -> Result<String, RelayError> {
        let mut stream = self.relay_model(model, prompt).await?;
        let mut text = String::new();
        while let Some(chunk) = stream.next().await {
            text.push_str(&chunk);
        }
        match stream.take_interruption() {
            Some(e) => Err(e),
            None => Ok(text),
        }
    }

    /// Fetch the provider's model listing unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::UpstreamConnect`], [`RelayError::UpstreamStatus`],
    /// or [`RelayError::Decode`].
    pub async fn list_models(&self) -> Result<serde_json::Value, RelayError> {
        let url = format!("{}/models", self.config.api_url);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| RelayError::UpstreamConnect(format!("model listing failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(RelayError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| RelayError::Decode(format!("model listing parse failed: {e}")))
    }

    fn stream_request(&self, model: &str, prompt: &str) -> reqwest::RequestBuilder {
        let (url, body) = match self.config.backend {
            BackendType::OpenAi => (
                format!("{}/chat/completions", self.config.api_url),
                serde_json::json!({
                    "model": model,
                    "messages": [{"role": "user", "content": prompt}],
                    "max_tokens": self.config.max_tokens,
                    "stream": true,
                }),
            ),
            BackendType::Anthropic => (
                format!("{}/messages", self.config.api_url),
                serde_json::json!({
                    "model": model,
                    "max_tokens": self.config.max_tokens,
                    "messages": [{"role": "user", "content": prompt}],
                    "stream": true,
                }),
            ),
        };
        self.authorize(self.client.post(url))
            .header("Accept", "text/event-stream")
            .json(&body)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.config.backend {
            BackendType::OpenAi => {
                request.header("Authorization", format!("Bearer {}", self.config.api_key))
            }
            BackendType::Anthropic => request
                .header("x-api-key", &self.config.api_key)
                .header("anthropic-version", "2023-06-01"),
        }
    }
}

// ---------------------------------------------------------------------------
// Pump task
// ---------------------------------------------------------------------------

type Chunk = Result<String, RelayError>;

/// Forward decoded deltas until completion, failure, or consumer drop.
async fn pump(response: reqwest::Response, backend: BackendType, tx: mpsc::Sender<Chunk>) {
    let mut body = response.bytes_stream();
    let mut decoder = SseDecoder::new(backend);
    let mut forwarded: u64 = 0;

    loop {
        let next = tokio::select! {
            () = tx.closed() => {
                debug!(forwarded, "relay consumer dropped, cancelling upstream");
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                if !forward(&tx, decoder.push(&bytes), &mut forwarded).await {
                    return;
                }
            }
            Some(Err(e)) => {
                warn!(forwarded, error = %e, "upstream stream interrupted");
                // The consumer may already be gone.
                let _ = tx.send(Err(RelayError::Interrupted(e.to_string()))).await;
                return;
            }
            None => {
                if forward(&tx, decoder.finish(), &mut forwarded).await {
                    info!(forwarded, "relay stream ended without completion marker");
                }
                return;
            }
        }
    }
}

/// Send frames in order. Returns `false` once the stream should stop.
async fn forward(tx: &mpsc::Sender<Chunk>, frames: Vec<SseFrame>, forwarded: &mut u64) -> bool {
    for frame in frames {
        match frame {
            SseFrame::Delta(text) => {
                if tx.send(Ok(text)).await.is_err() {
                    return false;
                }
                *forwarded = forwarded.saturating_add(1);
            }
            SseFrame::Done => {
                info!(forwarded = *forwarded, "relay stream complete");
                return false;
            }
        }
    }
    true
}

// ---------------------------------------------------------------------------
// Token stream
// ---------------------------------------------------------------------------

/// Ordered text chunks from one relay call.
///
/// Ends exactly once: on completion, on upstream failure, or when the
/// upstream body ends. After an upstream failure the error is kept in
/// [`TokenStream::interruption`] and every chunk already yielded stays valid.
#[derive(Debug)]
pub struct TokenStream {
    rx: mpsc::Receiver<Chunk>,
    interruption: Option<RelayError>,
    finished: bool,
}

impl TokenStream {
    const fn new(rx: mpsc::Receiver<Chunk>) -> Self {
        Self {
            rx,
            interruption: None,
            finished: false,
        }
    }

    /// The upstream failure that ended the stream, if any.
    pub const fn interruption(&self) -> Option<&RelayError> {
        self.interruption.as_ref()
    }

    /// Take the upstream failure out of the stream.
    pub fn take_interruption(&mut self) -> Option<RelayError> {
        self.interruption.take()
    }

    /// Whether the stream has ended.
    pub const fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Stream for TokenStream {
    type Item = String;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(chunk)),
            Poll::Ready(Some(Err(e))) => {
                this.interruption = Some(e);
                this.finished = true;
                this.rx.close();
                Poll::Ready(None)
            }
            Poll::Ready(None) => {
                this.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
