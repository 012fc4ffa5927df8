//! Decision prompt rendering via `minijinja`.
//!
//! The default template is compiled into the binary from
//! `templates/vendor.j2`. Operators can point `simulation.prompt_template`
//! at a file to tune the wording without recompiling.

use std::path::Path;

use chrono::SecondsFormat;
use minijinja::Environment;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::config::CatalogEntry;
use crate::store::PlanningView;

const TEMPLATE_NAME: &str = "vendor";
const DEFAULT_TEMPLATE: &str = include_str!("../templates/vendor.j2");

/// Errors from template loading or rendering.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// The template file could not be read.
    #[error("failed to read prompt template {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The template failed to compile or render.
    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// One inventory line in the prompt.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryLine {
    /// Product name.
    pub name: String,
    /// Units in stock.
    pub quantity: u32,
    /// Retail price, two decimals.
    pub price: String,
}

/// One recent sale in the prompt.
#[derive(Debug, Clone, Serialize)]
pub struct SaleLine {
    /// Product sold.
    pub product: String,
    /// Sale amount, two decimals.
    pub price: String,
    /// RFC 3339 timestamp.
    pub at: String,
}

/// One vendor catalog line in the prompt.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogLine {
    /// Product name.
    pub name: String,
    /// Unit restock cost, two decimals.
    pub cost: String,
}

/// One earlier decision in the prompt.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryLine {
    /// Step the decision was applied at.
    pub step: u64,
    /// What the model said.
    pub response: String,
}

/// Everything the template can see.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionContext {
    /// Cash on hand, two decimals.
    pub balance: String,
    /// Current stock.
    pub inventory: Vec<InventoryLine>,
    /// Recent customer sales, oldest first.
    pub recent_sales: Vec<SaleLine>,
    /// What the vendor sells.
    pub catalog: Vec<CatalogLine>,
    /// Recent decisions, oldest first.
    pub history: Vec<HistoryLine>,
}

fn money(value: Decimal) -> String {
    format!("{value:.2}")
}

impl DecisionContext {
    /// Build the context from a store read and the vendor catalog.
    pub fn build(view: &PlanningView, catalog: &[CatalogEntry]) -> Self {
        Self {
            balance: money(view.balance),
            inventory: view
                .book
                .items()
                .into_iter()
                .map(|item| InventoryLine {
                    name: item.product_name,
                    quantity: item.quantity_in_stock,
                    price: money(item.retail_price),
                })
                .collect(),
            recent_sales: view
                .recent_sales
                .iter()
                .map(|sale| SaleLine {
                    product: sale.product.clone(),
                    price: money(sale.price),
                    at: sale.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                })
                .collect(),
            catalog: catalog
                .iter()
                .map(|entry| CatalogLine {
                    name: entry.product_name.clone(),
                    cost: money(entry.vendor_cost),
                })
                .collect(),
            history: view
                .recent_logs
                .iter()
                .map(|log| HistoryLine {
                    step: log.step_number,
                    response: log.response.trim().to_owned(),
                })
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Compiled decision prompt template.
#[derive(Debug)]
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    /// Engine with the built-in template.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Template`] if the template fails to compile.
    pub fn new() -> Result<Self, PromptError> {
        Self::from_source(DEFAULT_TEMPLATE.to_owned())
    }

    /// Engine with a template read from disk.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Io`] if the file cannot be read, or
    /// [`PromptError::Template`] if it fails to compile.
    pub fn from_file(path: &Path) -> Result<Self, PromptError> {
        let source = std::fs::read_to_string(path).map_err(|source| PromptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_source(source)
    }

    fn from_source(source: String) -> Result<Self, PromptError> {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.add_template_owned(TEMPLATE_NAME, source)?;
        Ok(Self { env })
    }

    /// Render the decision prompt.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::Template`] if rendering fails.
    pub fn render(&self, context: &DecisionContext) -> Result<String, PromptError> {
        Ok(self.env.get_template(TEMPLATE_NAME)?.render(context)?)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use chrono::Utc;
    use webvend_ledger::InventoryBook;
    use webvend_types::{EventId, InventoryItem, Transaction, TransactionAction};

    fn view(with_sale: bool) -> PlanningView {
        let recent_sales = if with_sale {
            vec![Transaction {
                id: EventId::new(),
                product: "Classic Cola".to_owned(),
                price: Decimal::new(125, 2),
                action: TransactionAction::SoldToCustomer,
                agent_name: Some("Customer".to_owned()),
                created_at: Utc::now(),
            }]
        } else {
            Vec::new()
        };
        PlanningView {
            book: InventoryBook::new([InventoryItem {
                product_name: "Classic Cola".to_owned(),
                vendor_cost: Decimal::new(5, 1),
                retail_price: Decimal::new(125, 2),
                quantity_in_stock: 7,
            }]),
            balance: Decimal::ONE_HUNDRED,
            recent_sales,
            recent_logs: Vec::new(),
        }
    }

    #[test]
    fn renders_every_section() {
        let engine = PromptEngine::new().unwrap();
        let context = DecisionContext::build(&view(true), &crate::config::default_catalog());
        let prompt = engine.render(&context).unwrap();

        assert!(prompt.starts_with("You are the AI operator of a vending machine."));
        assert!(prompt.contains("cash balance of $100.00"));
        assert!(prompt.contains("- Classic Cola: 7 units @ $1.25"));
        assert!(prompt.contains("- Sold Classic Cola for $1.25 at "));
        assert!(prompt.contains("- Energy Drink: $1.50"));
        assert!(prompt.contains("No previous decisions."));
        assert!(prompt.trim_end().ends_with("Your decision:"));
    }

    #[test]
    fn empty_sales_render_placeholder() {
        let engine = PromptEngine::new().unwrap();
        let prompt = engine
            .render(&DecisionContext::build(&view(false), &[]))
            .unwrap();
        assert!(prompt.contains("No recent sales."));
    }

    #[test]
    fn broken_template_is_an_error() {
        assert!(matches!(
            PromptEngine::from_source("{% for x in %}".to_owned()),
            Err(PromptError::Template(_))
        ));
    }
}
