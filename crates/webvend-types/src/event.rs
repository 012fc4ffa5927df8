//! The append-only event and its closed set of kinds.
//!
//! Events arrive loosely typed: a `type` tag plus an arbitrary JSON payload.
//! [`EventKind::from_parts`] is the single validation boundary that turns
//! them into a closed variant. Numeric fields are coerced so that nothing
//! downstream ever sees a missing value, a NaN, or an infinity. Anything
//! that does not fit a known tag becomes [`EventKind::Unknown`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ts_rs::TS;

use crate::enums::TransactionAction;
use crate::ids::EventId;
use crate::structs::Transaction;

/// An immutable entry in the event log.
///
/// Serializes as [`EventRecord`]: `{id, timestamp, type, payload,
/// agent_response}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "EventRecord", into = "EventRecord")]
pub struct Event {
    /// Event identifier.
    pub id: EventId,
    /// When the event was appended.
    pub timestamp: DateTime<Utc>,
    /// Validated kind.
    pub kind: EventKind,
    /// Who produced the event.
    pub agent_name: Option<String>,
    /// Opaque response attached by the producer.
    pub agent_response: Value,
}

impl Event {
    /// Create a new event stamped with the current time.
    pub fn new(kind: EventKind, agent_name: Option<String>, agent_response: Value) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            kind,
            agent_name,
            agent_response,
        }
    }

    /// Display view of this event, if it is a known kind.
    pub fn transaction(&self) -> Option<Transaction> {
        let (product, price, action) = match &self.kind {
            EventKind::SoldToCustomer {
                product, amount, ..
            } => (product, *amount, TransactionAction::SoldToCustomer),
            EventKind::BoughtFromVendor { product, cost, .. } => {
                (product, *cost, TransactionAction::BoughtFromVendor)
            }
            EventKind::PriceChange { product, price } => {
                (product, *price, TransactionAction::PriceChange)
            }
            EventKind::Unknown { .. } => return None,
        };
        Some(Transaction {
            id: self.id,
            product: product.clone(),
            price,
            action,
            agent_name: self.agent_name.clone(),
            created_at: self.timestamp,
        })
    }
}

/// Closed set of event kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A customer bought `quantity` units for a total of `amount`.
    SoldToCustomer {
        /// Product sold.
        product: String,
        /// Total sale amount.
        amount: Decimal,
        /// Units sold.
        quantity: u32,
    },
    /// The operator restocked `quantity` units for a total of `cost`.
    BoughtFromVendor {
        /// Product bought.
        product: String,
        /// Total restock cost.
        cost: Decimal,
        /// Units bought.
        quantity: u32,
    },
    /// A retail price was changed.
    PriceChange {
        /// Product repriced.
        product: String,
        /// New retail price.
        price: Decimal,
    },
    /// Anything that failed validation or carried an unrecognized tag.
    Unknown {
        /// The original `type` tag.
        type_name: String,
        /// The original payload, untouched.
        raw: Value,
    },
}

impl EventKind {
    /// Validate a loosely-typed `(type, payload)` pair.
    ///
    /// A known tag whose payload is not an object falls back to
    /// [`EventKind::Unknown`]. Numeric fields that are missing, non-numeric,
    /// negative, or non-finite coerce to zero. A missing product name is
    /// kept as an empty string.
    pub fn from_parts(type_name: &str, payload: &Value) -> Self {
        let Some(fields) = payload.as_object() else {
            return Self::unknown(type_name, payload.clone());
        };
        let product = product_name(fields).unwrap_or_default();

        match type_name {
            "sold_to_customer" => {
                let quantity = quantity(fields);
                let amount = fields
                    .get("amount")
                    .or_else(|| fields.get("price"))
                    .map_or(Decimal::ZERO, coerce_money);
                Self::SoldToCustomer {
                    product,
                    amount,
                    quantity,
                }
            }
            "bought_from_vendor" => Self::BoughtFromVendor {
                product,
                cost: fields.get("cost").map_or(Decimal::ZERO, coerce_money),
                quantity: quantity(fields),
            },
            "price_change" => Self::PriceChange {
                product,
                price: fields
                    .get("price")
                    .or_else(|| fields.get("new_price"))
                    .map_or(Decimal::ZERO, coerce_money),
            },
            _ => Self::unknown(type_name, payload.clone()),
        }
    }

    /// Build an [`EventKind::Unknown`].
    pub fn unknown(type_name: &str, raw: Value) -> Self {
        Self::Unknown {
            type_name: type_name.to_owned(),
            raw,
        }
    }

    /// The wire `type` tag.
    pub fn type_name(&self) -> &str {
        match self {
            Self::SoldToCustomer { .. } => TransactionAction::SoldToCustomer.as_str(),
            Self::BoughtFromVendor { .. } => TransactionAction::BoughtFromVendor.as_str(),
            Self::PriceChange { .. } => TransactionAction::PriceChange.as_str(),
            Self::Unknown { type_name, .. } => type_name,
        }
    }

    /// The wire payload.
    pub fn payload(&self) -> Value {
        match self {
            Self::SoldToCustomer {
                product,
                amount,
                quantity,
            } => serde_json::json!({
                "product": product,
                "amount": money_value(*amount),
                "quantity": quantity,
            }),
            Self::BoughtFromVendor {
                product,
                cost,
                quantity,
            } => serde_json::json!({
                "product": product,
                "cost": money_value(*cost),
                "quantity": quantity,
            }),
            Self::PriceChange { product, price } => serde_json::json!({
                "product": product,
                "price": money_value(*price),
            }),
            Self::Unknown { raw, .. } => raw.clone(),
        }
    }

    /// Product this event concerns, if any.
    pub fn product(&self) -> Option<&str> {
        match self {
            Self::SoldToCustomer { product, .. }
            | Self::BoughtFromVendor { product, .. }
            | Self::PriceChange { product, .. } => Some(product),
            Self::Unknown { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Wire form
// ---------------------------------------------------------------------------

/// Serialized shape of an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EventRecord {
    /// Event identifier.
    pub id: EventId,
    /// When the event was appended.
    pub timestamp: DateTime<Utc>,
    /// Kind tag.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Tag-specific fields.
    #[serde(default)]
    #[ts(type = "unknown")]
    pub payload: Value,
    /// Who produced the event.
    #[serde(default)]
    pub agent_name: Option<String>,
    /// Opaque response attached by the producer.
    #[serde(default)]
    #[ts(type = "unknown")]
    pub agent_response: Value,
}

impl From<EventRecord> for Event {
    fn from(record: EventRecord) -> Self {
        Self {
            id: record.id,
            timestamp: record.timestamp,
            kind: EventKind::from_parts(&record.event_type, &record.payload),
            agent_name: record.agent_name,
            agent_response: record.agent_response,
        }
    }
}

impl From<Event> for EventRecord {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            timestamp: event.timestamp,
            event_type: event.kind.type_name().to_owned(),
            payload: event.kind.payload(),
            agent_name: event.agent_name,
            agent_response: event.agent_response,
        }
    }
}

// ---------------------------------------------------------------------------
// Coercion helpers
// ---------------------------------------------------------------------------

fn product_name(fields: &Map<String, Value>) -> Option<String> {
    ["product", "product_name", "item_name", "item"]
        .iter()
        .filter_map(|key| fields.get(*key))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|name| !name.is_empty())
        .map(ToOwned::to_owned)
}

fn quantity(fields: &Map<String, Value>) -> u32 {
    fields
        .get("quantity")
        .and_then(Value::as_u64)
        .and_then(|q| u32::try_from(q).ok())
        .unwrap_or(1)
}

/// Coerce a JSON value to a non-negative, finite amount.
///
/// Accepts integers, floats, and numeric strings. Everything else is zero.
pub fn coerce_money(value: &Value) -> Decimal {
    let parsed = match value {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    };
    parsed
        .filter(|d| d.is_sign_positive())
        .unwrap_or(Decimal::ZERO)
}

fn money_value(amount: Decimal) -> Value {
    rust_decimal::serde::float::serialize(&amount, serde_json::value::Serializer)
        .unwrap_or(Value::Null)
}
