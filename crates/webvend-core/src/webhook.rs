//! Webhook envelope parsing.
//!
//! External producers post `{"record": {"message": ...}}` or
//! `{"record": {"type": ..., "payload": ...}}`. The message may itself be a
//! JSON string. Whatever arrives, exactly one event comes out: anything that
//! cannot be read becomes an `unknown` event carrying the raw input.

use serde_json::{Map, Value, json};
use tracing::debug;
use webvend_types::EventKind;

/// Type tag for events whose type could not be determined.
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";

/// The fixed response attached to webhook events and returned to callers.
pub fn acknowledgement() -> Value {
    json!({"message": "acknowledged"})
}

/// Parse a raw webhook body into an event kind.
pub fn parse_envelope(body: &[u8]) -> EventKind {
    match serde_json::from_slice::<Value>(body) {
        Ok(envelope) => parse_value(&envelope),
        Err(e) => {
            debug!(error = %e, "webhook body is not JSON");
            unknown(Value::String(String::from_utf8_lossy(body).into_owned()))
        }
    }
}

/// Parse an already-decoded envelope.
pub fn parse_value(envelope: &Value) -> EventKind {
    let empty = Value::Object(Map::new());
    let record = envelope.get("record").unwrap_or(&empty);
    let raw = record.get("message").unwrap_or(record);

    let decoded;
    let raw = match raw {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                decoded = value;
                &decoded
            }
            Err(_) => return unknown(raw.clone()),
        },
        other => other,
    };

    let type_name = raw
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(UNKNOWN_EVENT_TYPE);
    let payload = raw.get("payload").unwrap_or(&empty);
    EventKind::from_parts(type_name, payload)
}

fn unknown(payload: Value) -> EventKind {
    EventKind::unknown(UNKNOWN_EVENT_TYPE, payload)
}
