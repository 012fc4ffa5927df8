//! Core entity structs for the Webvend simulation.
//!
//! Money fields are [`Decimal`] in memory and JSON numbers on the wire, so
//! the dashboard can format them directly.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{RunStatus, TransactionAction};
use crate::ids::{EventId, RunId};

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// One product slot in the vending machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct InventoryItem {
    /// Unique product name.
    pub product_name: String,
    /// Unit cost when restocking from the vendor.
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub vendor_cost: Decimal,
    /// Price charged to customers.
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub retail_price: Decimal,
    /// Units currently in the machine. Never negative.
    pub quantity_in_stock: u32,
}

/// The operator's cash account. Derived from the event log, never edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct CashAccount {
    /// Account label.
    pub account_name: String,
    /// Current balance.
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub balance: Decimal,
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

/// Display view of a known event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Transaction {
    /// Id of the source event.
    pub id: EventId,
    /// Product the transaction concerns.
    pub product: String,
    /// Sale amount, restock cost, or new retail price depending on `action`.
    #[serde(with = "rust_decimal::serde::float")]
    #[ts(type = "number")]
    pub price: Decimal,
    /// Transaction category.
    pub action: TransactionAction,
    /// Who caused it (`Customer`, `VendingMachine`, or an external source).
    pub agent_name: Option<String>,
    /// When the source event was appended.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

/// A simulation run driven by the step scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SimulationRun {
    /// Run identifier.
    pub run_id: RunId,
    /// Model the decision source is asked to use.
    pub model_id: String,
    /// Number of successfully applied ticks.
    pub step_number: u64,
    /// Lifecycle status.
    pub status: RunStatus,
    /// When the run was first started.
    pub started_at: DateTime<Utc>,
}

/// Per-step decision record for a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct StepLog {
    /// Run the step belongs to.
    pub run_id: RunId,
    /// Step number after the step was applied (1-based).
    pub step_number: u64,
    /// Agent that made the decision.
    pub agent_name: String,
    /// Rendered prompt sent to the model.
    pub prompt: String,
    /// Raw model response.
    pub response: String,
    /// Parsed and resolved action, as JSON.
    #[ts(type = "unknown")]
    pub parsed_action: serde_json::Value,
    /// When the step was committed.
    pub created_at: DateTime<Utc>,
}
