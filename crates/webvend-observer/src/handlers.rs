//! Vending read endpoints, the purchase endpoint, and the model listing.
//!
//! All reads are projections of the event log served by the
//! [`SimulationStore`](webvend_core::SimulationStore).
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/api/vending/inventory` | Current inventory |
//! | `GET` | `/api/vending/balance` | Cash account |
//! | `GET` | `/api/vending/transactions` | Transactions, newest first |
//! | `GET` | `/api/vending/ledger` | Derived financial snapshot |
//! | `GET` | `/api/vending/metrics` | Performance metrics and stock valuation |
//! | `POST` | `/api/vending/purchase` | Sell one unit to a customer |
//! | `GET` | `/api/models` | Provider model list |

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use webvend_types::InventoryItem;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Query parameter and body structs
// ---------------------------------------------------------------------------

/// Query parameters for `GET /api/vending/transactions`.
#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    /// Maximum number of transactions to return.
    pub limit: Option<usize>,
}

/// Request body for `POST /api/vending/purchase`.
#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    /// Product to buy.
    pub item: String,
}

#[derive(Debug, Serialize)]
struct PurchaseResponse {
    message: String,
    item: InventoryItem,
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// `GET /api/vending/inventory`
pub async fn inventory(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(serde_json::json!({ "inventory": state.store.inventory().await }))
}

/// `GET /api/vending/balance`: `{account_name, balance}`.
pub async fn balance(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.cash_account().await)
}

/// `GET /api/vending/transactions`
pub async fn transactions(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TransactionsQuery>,
) -> Result<impl IntoResponse, ObserverError> {
    if query.limit == Some(0) {
        return Err(ObserverError::InvalidQuery(
            "limit must be at least 1".to_owned(),
        ));
    }
    let transactions = state.store.transactions(query.limit).await;
    Ok(Json(serde_json::json!({ "transactions": transactions })))
}

/// `GET /api/vending/ledger`
pub async fn ledger(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.snapshot().await)
}

/// `GET /api/vending/metrics`
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = state.store.metrics().await;
    let valuation = state.store.valuation().await;
    Json(serde_json::json!({
        "performance": metrics,
        "inventory_value": valuation,
    }))
}

// ---------------------------------------------------------------------------
// POST /api/vending/purchase
// ---------------------------------------------------------------------------

/// Sell one unit of `item` at its current retail price.
///
/// Returns 404 for a product the machine does not carry and 400 when it is
/// sold out.
pub async fn purchase(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PurchaseRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    state.store.record_sale(&body.item).await?;
    let item = state
        .store
        .inventory()
        .await
        .into_iter()
        .find(|i| i.product_name == body.item)
        .ok_or_else(|| ObserverError::Internal(format!("{} vanished after sale", body.item)))?;
    Ok(Json(PurchaseResponse {
        message: format!("Purchased {}", body.item),
        item,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/models
// ---------------------------------------------------------------------------

/// Pass the provider's model listing through unchanged.
pub async fn models(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    Ok(Json(state.relay.list_models().await?))
}
