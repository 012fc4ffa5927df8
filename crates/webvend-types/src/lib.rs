//! Shared type definitions for the Webvend simulation.
//!
//! This crate is the single source of truth for the types used across the
//! Webvend workspace. Wire types flow downstream to `TypeScript` via `ts-rs`
//! for the dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for runs and events
//! - [`enums`] -- Transaction taxonomy, run status, sync resources
//! - [`structs`] -- Inventory, cash account, transactions, runs, step logs
//! - [`event`] -- The append-only [`Event`] and its closed [`EventKind`]
//! - [`actions`] -- The closed [`AgentAction`] set

pub mod actions;
pub mod enums;
pub mod event;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use actions::AgentAction;
pub use enums::{RunStatus, SyncResource, TransactionAction};
pub use event::{Event, EventKind, EventRecord, coerce_money};
pub use ids::{EventId, RunId};
pub use structs::{CashAccount, InventoryItem, SimulationRun, StepLog, Transaction};
