//! Operator actions the decision source can choose.
//!
//! The decision source answers with loosely-typed text. Once parsed, an
//! action is one of a closed set of variants, each with its required fields.
//! Unknown tags deserialize to [`AgentAction::NoOp`] instead of failing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// A single decision for one tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
#[ts(export, export_to = "bindings/")]
pub enum AgentAction {
    /// Restock from the vendor.
    Buy {
        /// Product to buy.
        item_name: String,
        /// Units to buy.
        quantity: u32,
    },
    /// Set a new retail price.
    UpdatePrice {
        /// Product to reprice.
        item_name: String,
        /// New retail price.
        #[serde(with = "rust_decimal::serde::float")]
        #[ts(type = "number")]
        price: Decimal,
    },
    /// Lower the retail price by a percentage.
    OfferDiscount {
        /// Product to discount.
        item_name: String,
        /// Discount in percent, exclusive range `0..100`.
        #[serde(alias = "discount")]
        discount_percent: u32,
    },
    /// Take no action this tick.
    #[serde(rename = "DO_NOTHING", other)]
    NoOp,
}

impl AgentAction {
    /// Short label for logs.
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Buy { .. } => "BUY",
            Self::UpdatePrice { .. } => "UPDATE_PRICE",
            Self::OfferDiscount { .. } => "OFFER_DISCOUNT",
            Self::NoOp => "DO_NOTHING",
        }
    }

    /// Product the action targets, if any.
    pub fn item_name(&self) -> Option<&str> {
        match self {
            Self::Buy { item_name, .. }
            | Self::UpdatePrice { item_name, .. }
            | Self::OfferDiscount { item_name, .. } => Some(item_name),
            Self::NoOp => None,
        }
    }
}
