//! Incremental server-sent-events decoder.
//!
//! Network chunks do not line up with SSE lines, so the decoder buffers raw
//! bytes and only interprets complete lines. Each `data:` line is a JSON
//! delta in the provider's format. Malformed lines are skipped.

use serde_json::Value;
use tracing::debug;

use crate::config::BackendType;

/// One decoded unit of provider output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Incremental text content.
    Delta(String),
    /// The provider signalled completion.
    Done,
}

/// Stateful line decoder for one upstream response.
#[derive(Debug)]
pub struct SseDecoder {
    backend: BackendType,
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Decoder for the given provider protocol.
    pub const fn new(backend: BackendType) -> Self {
        Self {
            backend,
            buffer: Vec::new(),
        }
    }

    /// Feed a network chunk and return every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(frame) = self.decode_line(&line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that arrived without a newline.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line).into_iter().collect()
    }

    fn decode_line(&self, raw: &[u8]) -> Option<SseFrame> {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        // Blank separators, `event:` names, and `:` keep-alive comments carry no data.
        let data = line.strip_prefix("data:")?.trim_start();
        if data == "[DONE]" {
            return Some(SseFrame::Done);
        }
        let json: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                debug!(error = %e, "skipping malformed SSE data line");
                return None;
            }
        };
        match self.backend {
            BackendType::OpenAi => extract_openai_delta(&json),
            BackendType::Anthropic => extract_anthropic_delta(&json),
        }
    }
}

/// `choices[0].delta.content` from an `OpenAI` stream chunk.
fn extract_openai_delta(json: &Value) -> Option<SseFrame> {
    json.get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(|s| SseFrame::Delta(s.to_owned()))
}

/// Text deltas and the stop marker from an Anthropic stream event.
fn extract_anthropic_delta(json: &Value) -> Option<SseFrame> {
    match json.get("type").and_then(Value::as_str) {
        Some("content_block_delta") => json
            .get("delta")
            .and_then(|d| d.get("text"))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(|s| SseFrame::Delta(s.to_owned())),
        Some("message_stop") => Some(SseFrame::Done),
        _ => None,
    }
}
