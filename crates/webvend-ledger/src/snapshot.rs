//! Financial snapshot derivation.
//!
//! [`LedgerFold`] is the accumulator. [`EventLedger::derive`] runs it over a
//! whole log in one left-to-right pass. The store keeps a live fold and
//! advances it one event at a time on append, which gives the same result
//! as a full derive because the fold never looks back.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::trace;
use webvend_types::{Event, EventKind};

/// Cash-side view of the simulation at a point in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancialSnapshot {
    /// `initial_balance + revenue - expenses`.
    #[serde(with = "rust_decimal::serde::float")]
    pub balance: Decimal,
    /// Sum of sale amounts.
    #[serde(with = "rust_decimal::serde::float")]
    pub revenue: Decimal,
    /// Sum of restock costs.
    #[serde(with = "rust_decimal::serde::float")]
    pub expenses: Decimal,
    /// `revenue - expenses`.
    #[serde(with = "rust_decimal::serde::float")]
    pub profit: Decimal,
    /// Profit as a percentage of revenue, or 0 with no revenue.
    #[serde(with = "rust_decimal::serde::float")]
    pub profit_margin: Decimal,
}

/// Incremental ledger accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerFold {
    initial_balance: Decimal,
    revenue: Decimal,
    expenses: Decimal,
    events_applied: u64,
}

impl LedgerFold {
    /// Start a fold at `initial_balance` with nothing applied.
    pub const fn new(initial_balance: Decimal) -> Self {
        Self {
            initial_balance,
            revenue: Decimal::ZERO,
            expenses: Decimal::ZERO,
            events_applied: 0,
        }
    }

    /// Fold one event in.
    ///
    /// Amounts are non-negative by construction of [`EventKind`]. Sums
    /// saturate at the `Decimal` range instead of overflowing.
    pub fn apply(&mut self, event: &Event) {
        match &event.kind {
            EventKind::SoldToCustomer { amount, .. } => {
                self.revenue = self.revenue.saturating_add(*amount);
            }
            EventKind::BoughtFromVendor { cost, .. } => {
                self.expenses = self.expenses.saturating_add(*cost);
            }
            EventKind::PriceChange { .. } => {}
            EventKind::Unknown { type_name, .. } => {
                trace!(event_id = %event.id, %type_name, "skipping unknown event in ledger fold");
            }
        }
        self.events_applied = self.events_applied.saturating_add(1);
    }

    /// Number of events folded so far.
    pub const fn events_applied(&self) -> u64 {
        self.events_applied
    }

    /// Current balance.
    pub fn balance(&self) -> Decimal {
        self.initial_balance
            .saturating_add(self.revenue)
            .saturating_sub(self.expenses)
    }

    /// Materialize the snapshot for everything folded so far.
    pub fn snapshot(&self) -> FinancialSnapshot {
        let profit = self.revenue.saturating_sub(self.expenses);
        let profit_margin = if self.revenue > Decimal::ZERO {
            profit
                .checked_div(self.revenue)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .unwrap_or(Decimal::ZERO)
        } else {
            Decimal::ZERO
        };

        FinancialSnapshot {
            balance: self.balance(),
            revenue: self.revenue,
            expenses: self.expenses,
            profit,
            profit_margin,
        }
    }
}

/// Pure derivation of a [`FinancialSnapshot`] from a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventLedger {
    initial_balance: Decimal,
}

impl EventLedger {
    /// A ledger whose balance starts at `initial_balance`.
    pub const fn new(initial_balance: Decimal) -> Self {
        Self { initial_balance }
    }

    /// Fold `events` in order into a snapshot. O(n), no side effects.
    pub fn derive(&self, events: &[Event]) -> FinancialSnapshot {
        events
            .iter()
            .fold(LedgerFold::new(self.initial_balance), |mut fold, event| {
                fold.apply(event);
                fold
            })
            .snapshot()
    }
}
