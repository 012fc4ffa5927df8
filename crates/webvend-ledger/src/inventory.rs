//! Inventory projection over the event log.
//!
//! Stock levels are seeded once per run and then moved only by events:
//! sales decrement, restocks increment, price changes rewrite the retail
//! price. [`InventoryBook::validate`] is checked before an event is
//! appended, so the projection can never go negative.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use webvend_types::{EventKind, InventoryItem};

use crate::LedgerError;

/// Current stock and prices, keyed by product name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryBook {
    items: BTreeMap<String, InventoryItem>,
}

impl InventoryBook {
    /// Seed the book. Later duplicates of a product name replace earlier ones.
    pub fn new(items: impl IntoIterator<Item = InventoryItem>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.product_name.clone(), item))
                .collect(),
        }
    }

    /// Look up one product.
    pub fn get(&self, product: &str) -> Option<&InventoryItem> {
        self.items.get(product)
    }

    /// All items, ordered by product name.
    pub fn items(&self) -> Vec<InventoryItem> {
        self.items.values().cloned().collect()
    }

    /// Check that `kind` can be applied without breaking an invariant.
    pub fn validate(&self, kind: &EventKind) -> Result<(), LedgerError> {
        match kind {
            EventKind::SoldToCustomer {
                product, quantity, ..
            } => {
                let item = self.require(product)?;
                if *quantity == 0 {
                    return Err(LedgerError::ZeroQuantity(product.clone()));
                }
                if item.quantity_in_stock < *quantity {
                    return Err(LedgerError::InsufficientStock {
                        product: product.clone(),
                        requested: *quantity,
                        available: item.quantity_in_stock,
                    });
                }
                Ok(())
            }
            EventKind::BoughtFromVendor {
                product, quantity, ..
            } => {
                let item = self.require(product)?;
                if *quantity == 0 {
                    return Err(LedgerError::ZeroQuantity(product.clone()));
                }
                item.quantity_in_stock
                    .checked_add(*quantity)
                    .map(|_| ())
                    .ok_or_else(|| LedgerError::StockOverflow(product.clone()))
            }
            EventKind::PriceChange { product, price } => {
                self.require(product)?;
                if *price <= Decimal::ZERO {
                    return Err(LedgerError::InvalidPrice {
                        product: product.clone(),
                        price: *price,
                    });
                }
                Ok(())
            }
            EventKind::Unknown { .. } => Ok(()),
        }
    }

    /// Validate and apply `kind`. On error the book is unchanged.
    pub fn apply(&mut self, kind: &EventKind) -> Result<(), LedgerError> {
        self.validate(kind)?;
        match kind {
            EventKind::SoldToCustomer {
                product, quantity, ..
            } => {
                if let Some(item) = self.items.get_mut(product) {
                    item.quantity_in_stock = item.quantity_in_stock.saturating_sub(*quantity);
                }
            }
            EventKind::BoughtFromVendor {
                product, quantity, ..
            } => {
                if let Some(item) = self.items.get_mut(product) {
                    item.quantity_in_stock = item.quantity_in_stock.saturating_add(*quantity);
                }
            }
            EventKind::PriceChange { product, price } => {
                if let Some(item) = self.items.get_mut(product) {
                    item.retail_price = *price;
                }
            }
            EventKind::Unknown { .. } => {}
        }
        Ok(())
    }

    fn require(&self, product: &str) -> Result<&InventoryItem, LedgerError> {
        self.items
            .get(product)
            .ok_or_else(|| LedgerError::UnknownProduct(product.to_owned()))
    }
}
