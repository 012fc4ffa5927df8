//! Event-sourced financial ledger for the Webvend simulation.
//!
//! Cash is never stored. The balance, revenue, expenses, and margin are
//! derived by folding the append-only event log from the start of the run.
//! The fold is a pure function of the log, so any prefix of the log always
//! derives the same snapshot no matter how long the log later grows.
//!
//! # Architecture
//!
//! - [`snapshot`] -- [`EventLedger`] and the incremental [`LedgerFold`].
//! - [`inventory`] -- [`InventoryBook`], the stock projection that rejects
//!   events which would drive stock negative.
//! - [`metrics`] -- Dashboard aggregates over the log and the inventory.
//!
//! # Derivation
//!
//! | Event | Effect |
//! |-------|--------|
//! | `sold_to_customer` | `revenue += amount` |
//! | `bought_from_vendor` | `expenses += cost` |
//! | `price_change` | none |
//! | unknown | none |
//!
//! ```text
//! balance = initial_balance + revenue - expenses
//! profit  = revenue - expenses
//! margin  = profit / revenue * 100   (0 when revenue is 0)
//! ```
//!
//! # Usage
//!
//! ```
//! use rust_decimal::Decimal;
//! use serde_json::json;
//! use webvend_ledger::EventLedger;
//! use webvend_types::{Event, EventKind};
//!
//! let events = vec![
//!     Event::new(EventKind::from_parts("sold_to_customer", &json!({"amount": 5})), None, json!(null)),
//!     Event::new(EventKind::from_parts("bought_from_vendor", &json!({"cost": 2})), None, json!(null)),
//! ];
//! let snapshot = EventLedger::new(Decimal::ZERO).derive(&events);
//! assert_eq!(snapshot.profit, Decimal::new(3, 0));
//! assert_eq!(snapshot.profit_margin, Decimal::new(60, 0));
//! ```

pub mod inventory;
pub mod metrics;
pub mod snapshot;

// Re-export primary types at crate root.
pub use inventory::InventoryBook;
pub use metrics::{InventoryValuation, PerformanceMetrics};
pub use snapshot::{EventLedger, FinancialSnapshot, LedgerFold};

use rust_decimal::Decimal;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Reasons an event cannot be applied to the inventory projection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The event names a product the machine does not carry.
    #[error("unknown product: {0:?}")]
    UnknownProduct(String),

    /// A sale would take stock below zero.
    #[error("insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        /// The product being sold.
        product: String,
        /// Units requested.
        requested: u32,
        /// Units on hand.
        available: u32,
    },

    /// A sale or restock moved zero units.
    #[error("quantity must be non-zero for {0}")]
    ZeroQuantity(String),

    /// A restock would overflow the stock counter.
    #[error("stock overflow for {0}")]
    StockOverflow(String),

    /// A price change to a non-positive price.
    #[error("invalid price {price} for {product}")]
    InvalidPrice {
        /// The product being repriced.
        product: String,
        /// The rejected price.
        price: Decimal,
    },
}
