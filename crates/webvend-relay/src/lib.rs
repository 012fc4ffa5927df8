//! Streaming inference relay for the Webvend simulation.
//!
//! Proxies a prompt to an LLM provider and forwards the answer as an
//! ordered stream of text chunks, one per upstream content delta. The relay
//! never buffers a full response on the streaming path.
//!
//! - [`config`] -- Provider protocol, URL, key, and default model.
//! - [`error`] -- [`RelayError`], split into pre-stream and mid-stream failures.
//! - [`sse`] -- Incremental SSE line decoder for both provider formats.
//! - [`relay`] -- [`InferenceRelay`] and the [`TokenStream`] it returns.

pub mod config;
pub mod error;
pub mod relay;
pub mod sse;

pub use config::{BackendType, RelayConfig};
pub use error::RelayError;
pub use relay::{InferenceRelay, TokenStream};
