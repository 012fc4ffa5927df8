//! Turning decisions into events.
//!
//! [`resolve_action`] checks a parsed [`AgentAction`] against the stock and
//! cash on hand and produces the events it implies. A rejected action is
//! not a tick failure; the tick records the reason and moves on.
//! [`simulate_demand`] plays the customers for one tick.

use rand::Rng;
use rust_decimal::Decimal;
use webvend_ledger::InventoryBook;
use webvend_types::{AgentAction, EventKind};

use crate::config::CatalogEntry;

/// Why an action was not applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionRejection {
    /// The product is not in the catalog or the machine.
    #[error("unknown product: {0}")]
    UnknownProduct(String),

    /// A buy of zero units.
    #[error("quantity must be positive")]
    ZeroQuantity,

    /// The restock costs more than the cash on hand.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds {
        /// Total restock cost.
        needed: Decimal,
        /// Cash on hand.
        available: Decimal,
    },

    /// A price that is zero or negative.
    #[error("price must be positive, got {0}")]
    InvalidPrice(Decimal),

    /// A discount outside `1..=99` percent.
    #[error("discount must be between 1 and 99 percent, got {0}")]
    InvalidDiscount(u32),

    /// The arithmetic left the representable range.
    #[error("amount out of range")]
    Overflow,
}

/// Resolve `action` into events, or explain why it cannot apply.
///
/// # Errors
///
/// Returns an [`ActionRejection`] when the action breaks a precondition.
/// [`AgentAction::NoOp`] always resolves to no events.
pub fn resolve_action(
    action: &AgentAction,
    book: &InventoryBook,
    balance: Decimal,
    catalog: &[CatalogEntry],
) -> Result<Vec<EventKind>, ActionRejection> {
    match action {
        AgentAction::Buy {
            item_name,
            quantity,
        } => {
            let entry = catalog
                .iter()
                .find(|e| e.product_name == *item_name)
                .ok_or_else(|| ActionRejection::UnknownProduct(item_name.clone()))?;
            if book.get(item_name).is_none() {
                return Err(ActionRejection::UnknownProduct(item_name.clone()));
            }
            if *quantity == 0 {
                return Err(ActionRejection::ZeroQuantity);
            }
            let cost = entry
                .vendor_cost
                .checked_mul(Decimal::from(*quantity))
                .ok_or(ActionRejection::Overflow)?;
            if cost > balance {
                return Err(ActionRejection::InsufficientFunds {
                    needed: cost,
                    available: balance,
                });
            }
            Ok(vec![EventKind::BoughtFromVendor {
                product: item_name.clone(),
                cost,
                quantity: *quantity,
            }])
        }
        AgentAction::UpdatePrice { item_name, price } => {
            if book.get(item_name).is_none() {
                return Err(ActionRejection::UnknownProduct(item_name.clone()));
            }
            if *price <= Decimal::ZERO {
                return Err(ActionRejection::InvalidPrice(*price));
            }
            Ok(vec![EventKind::PriceChange {
                product: item_name.clone(),
                price: *price,
            }])
        }
        AgentAction::OfferDiscount {
            item_name,
            discount_percent,
        } => {
            let item = book
                .get(item_name)
                .ok_or_else(|| ActionRejection::UnknownProduct(item_name.clone()))?;
            if *discount_percent == 0 || *discount_percent >= 100 {
                return Err(ActionRejection::InvalidDiscount(*discount_percent));
            }
            let kept = 100_u32
                .checked_sub(*discount_percent)
                .ok_or(ActionRejection::InvalidDiscount(*discount_percent))?;
            let price = item
                .retail_price
                .checked_mul(Decimal::from(kept))
                .and_then(|p| p.checked_div(Decimal::ONE_HUNDRED))
                .ok_or(ActionRejection::Overflow)?
                .round_dp(2);
            if price <= Decimal::ZERO {
                return Err(ActionRejection::InvalidPrice(price));
            }
            Ok(vec![EventKind::PriceChange {
                product: item_name.clone(),
                price,
            }])
        }
        AgentAction::NoOp => Ok(Vec::new()),
    }
}

/// One tick of customer demand.
///
/// Every in-stock product independently sells one unit at its current
/// retail price with the given probability.
pub fn simulate_demand(book: &InventoryBook, probability: f64, rng: &mut impl Rng) -> Vec<EventKind> {
    let p = if probability.is_finite() {
        probability.clamp(0.0, 1.0)
    } else {
        0.0
    };
    book.items()
        .into_iter()
        .filter(|item| item.quantity_in_stock > 0)
        .filter(|_| rng.random_bool(p))
        .map(|item| EventKind::SoldToCustomer {
            product: item.product_name,
            amount: item.retail_price,
            quantity: 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use webvend_types::InventoryItem;

    use super::*;
    use crate::config::default_catalog;

    fn book() -> InventoryBook {
        InventoryBook::new(default_catalog().iter().map(CatalogEntry::to_item))
    }

    fn buy(name: &str, quantity: u32) -> AgentAction {
        AgentAction::Buy {
            item_name: name.to_owned(),
            quantity,
        }
    }

    #[test]
    fn buy_costs_unit_cost_times_quantity() {
        let events = resolve_action(&buy("Classic Cola", 10), &book(), Decimal::ONE_HUNDRED, &default_catalog());
        assert_eq!(
            events,
            Ok(vec![EventKind::BoughtFromVendor {
                product: "Classic Cola".to_owned(),
                cost: Decimal::new(500, 2),
                quantity: 10,
            }])
        );
    }

    #[test]
    fn buy_rejections() {
        let catalog = default_catalog();
        assert_eq!(
            resolve_action(&buy("Caviar", 1), &book(), Decimal::ONE_HUNDRED, &catalog),
            Err(ActionRejection::UnknownProduct("Caviar".to_owned()))
        );
        assert_eq!(
            resolve_action(&buy("Gum", 0), &book(), Decimal::ONE_HUNDRED, &catalog),
            Err(ActionRejection::ZeroQuantity)
        );
        assert!(matches!(
            resolve_action(&buy("Energy Drink", 100), &book(), Decimal::ONE_HUNDRED, &catalog),
            Err(ActionRejection::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn discount_reprices_from_retail() {
        let action = AgentAction::OfferDiscount {
            item_name: "Classic Cola".to_owned(),
            discount_percent: 20,
        };
        assert_eq!(
            resolve_action(&action, &book(), Decimal::ZERO, &[]),
            Ok(vec![EventKind::PriceChange {
                product: "Classic Cola".to_owned(),
                price: Decimal::ONE,
            }])
        );
        let too_much = AgentAction::OfferDiscount {
            item_name: "Classic Cola".to_owned(),
            discount_percent: 100,
        };
        assert_eq!(
            resolve_action(&too_much, &book(), Decimal::ZERO, &[]),
            Err(ActionRejection::InvalidDiscount(100))
        );
    }

    #[test]
    fn update_price_needs_positive_price() {
        let action = AgentAction::UpdatePrice {
            item_name: "Gum".to_owned(),
            price: Decimal::ZERO,
        };
        assert_eq!(
            resolve_action(&action, &book(), Decimal::ZERO, &[]),
            Err(ActionRejection::InvalidPrice(Decimal::ZERO))
        );
        assert_eq!(resolve_action(&AgentAction::NoOp, &book(), Decimal::ZERO, &[]), Ok(Vec::new()));
    }

    #[test]
    fn demand_respects_stock_and_probability() {
        let mut rng = StdRng::seed_from_u64(7);
        let empty = InventoryBook::new([InventoryItem {
            product_name: "Gum".to_owned(),
            vendor_cost: Decimal::ONE,
            retail_price: Decimal::TWO,
            quantity_in_stock: 0,
        }]);
        assert!(simulate_demand(&empty, 1.0, &mut rng).is_empty());
        assert!(simulate_demand(&book(), 0.0, &mut rng).is_empty());

        let sales = simulate_demand(&book(), 1.0, &mut rng);
        assert_eq!(sales.len(), 9);
        assert!(sales.iter().all(|s| matches!(s, EventKind::SoldToCustomer { quantity: 1, .. })));
        assert!(simulate_demand(&book(), f64::NAN, &mut rng).is_empty());
    }

    #[test]
    fn seeded_demand_is_deterministic() {
        let a = simulate_demand(&book(), 0.5, &mut StdRng::seed_from_u64(42));
        let b = simulate_demand(&book(), 0.5, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }
}
