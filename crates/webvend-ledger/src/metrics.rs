//! Dashboard aggregates: sales performance and inventory valuation.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use webvend_types::{Event, EventKind, InventoryItem};

/// Sales performance over a log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Number of sale events.
    pub total_sales: u64,
    /// Units sold across all sale events.
    pub units_sold: u64,
    /// Sum of sale amounts.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_revenue: Decimal,
    /// `total_revenue / total_sales`, or 0 with no sales.
    #[serde(with = "rust_decimal::serde::float")]
    pub average_transaction_value: Decimal,
    /// Product with the most units sold. Ties go to the first name.
    pub top_selling_product: Option<String>,
    /// Number of restock events.
    pub restocks: u64,
    /// Number of price changes.
    pub price_changes: u64,
}

impl PerformanceMetrics {
    /// Aggregate `events` in one pass.
    pub fn from_events(events: &[Event]) -> Self {
        let mut total_sales: u64 = 0;
        let mut units_sold: u64 = 0;
        let mut total_revenue = Decimal::ZERO;
        let mut restocks: u64 = 0;
        let mut price_changes: u64 = 0;
        let mut units_by_product: BTreeMap<&str, u64> = BTreeMap::new();

        for event in events {
            match &event.kind {
                EventKind::SoldToCustomer {
                    product,
                    amount,
                    quantity,
                } => {
                    total_sales = total_sales.saturating_add(1);
                    units_sold = units_sold.saturating_add(u64::from(*quantity));
                    total_revenue = total_revenue.saturating_add(*amount);
                    let units = units_by_product.entry(product.as_str()).or_insert(0);
                    *units = units.saturating_add(u64::from(*quantity));
                }
                EventKind::BoughtFromVendor { .. } => restocks = restocks.saturating_add(1),
                EventKind::PriceChange { .. } => {
                    price_changes = price_changes.saturating_add(1);
                }
                EventKind::Unknown { .. } => {}
            }
        }

        let average_transaction_value = if total_sales == 0 {
            Decimal::ZERO
        } else {
            total_revenue
                .checked_div(Decimal::from(total_sales))
                .unwrap_or(Decimal::ZERO)
                .round_dp(2)
        };

        // BTreeMap iterates names in order; keep the first maximum.
        let top_selling_product = units_by_product
            .iter()
            .filter(|(name, _)| !name.is_empty())
            .fold(None::<(&str, u64)>, |best, (name, units)| match best {
                Some((_, top)) if top >= *units => best,
                _ => Some((*name, *units)),
            })
            .map(|(name, _)| name.to_owned());

        Self {
            total_sales,
            units_sold,
            total_revenue,
            average_transaction_value,
            top_selling_product,
            restocks,
            price_changes,
        }
    }
}

/// What the current stock is worth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryValuation {
    /// Units on hand across all products.
    pub total_units: u64,
    /// Stock valued at retail prices.
    #[serde(with = "rust_decimal::serde::float")]
    pub retail_value: Decimal,
    /// Stock valued at vendor cost.
    #[serde(with = "rust_decimal::serde::float")]
    pub cost_value: Decimal,
    /// `retail_value - cost_value`.
    #[serde(with = "rust_decimal::serde::float")]
    pub potential_profit: Decimal,
}

impl InventoryValuation {
    /// Value a set of inventory items.
    pub fn from_items(items: &[InventoryItem]) -> Self {
        let mut total_units: u64 = 0;
        let mut retail_value = Decimal::ZERO;
        let mut cost_value = Decimal::ZERO;

        for item in items {
            let units = Decimal::from(item.quantity_in_stock);
            total_units = total_units.saturating_add(u64::from(item.quantity_in_stock));
            retail_value = retail_value.saturating_add(item.retail_price.saturating_mul(units));
            cost_value = cost_value.saturating_add(item.vendor_cost.saturating_mul(units));
        }

        Self {
            total_units,
            retail_value,
            cost_value,
            potential_profit: retail_value.saturating_sub(cost_value),
        }
    }
}
