//! Enumeration types for the Webvend simulation.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Transaction taxonomy
// ---------------------------------------------------------------------------

/// The display category of a [`Transaction`](crate::structs::Transaction).
///
/// Every known event maps onto exactly one of these. Unknown events have no
/// transaction view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TransactionAction {
    /// A customer bought a unit from the machine.
    SoldToCustomer,
    /// The operator restocked from the vendor.
    BoughtFromVendor,
    /// The operator changed a retail price.
    PriceChange,
}

impl TransactionAction {
    /// The wire tag used for this action in event `type` fields.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SoldToCustomer => "sold_to_customer",
            Self::BoughtFromVendor => "bought_from_vendor",
            Self::PriceChange => "price_change",
        }
    }
}

// ---------------------------------------------------------------------------
// Run lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle status of a simulation run.
///
/// ```text
/// idle -> active -> paused -> active
///           |
///           +-> error -> active (manual resume) | idle (reset)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum RunStatus {
    /// No run exists.
    Idle,
    /// The run is ticking.
    Active,
    /// The run was paused by the operator.
    Paused,
    /// A tick failed; the run waits for an explicit resume.
    Error,
}

impl core::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Sync resources
// ---------------------------------------------------------------------------

/// A named view that clients can subscribe to for live updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SyncResource {
    /// The inventory table.
    Inventory,
    /// The derived financial snapshot.
    Ledger,
    /// The transaction history.
    Transactions,
}

impl SyncResource {
    /// Parse a resource from its path segment.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "inventory" => Some(Self::Inventory),
            "ledger" => Some(Self::Ledger),
            "transactions" => Some(Self::Transactions),
            _ => None,
        }
    }
}
