//! In-memory simulation store.
//!
//! [`SimulationStore`] owns the append-only event log, the per-step decision
//! logs, and two projections that are advanced on every append: the
//! [`InventoryBook`] and the [`LedgerFold`]. Readers get cloned views and
//! never hold the lock across an await point.
//!
//! Every event is checked against the inventory projection before it is
//! appended. An event that would break a stock or price invariant is kept,
//! but downgraded to [`EventKind::Unknown`] with the rejection reason, so
//! the log still records that it arrived.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use webvend_ledger::{
    FinancialSnapshot, InventoryBook, InventoryValuation, LedgerError, LedgerFold,
    PerformanceMetrics,
};
use webvend_types::{
    CashAccount, Event, EventKind, InventoryItem, RunId, StepLog, SyncResource, Transaction,
};

/// Capacity of the change notice channel.
///
/// A subscriber that falls further behind receives `Lagged` and must
/// resync from a full read.
const NOTICE_CAPACITY: usize = 256;

/// Type tag given to events that failed inventory validation.
pub const REJECTED_EVENT_TYPE: &str = "rejected";

/// Agent name recorded on customer sales.
pub const CUSTOMER_AGENT: &str = "Customer";

/// Name of the derived cash account.
pub const CASH_ACCOUNT_NAME: &str = "VendingMachine";

/// Signal that a resource changed. Carries no data; readers re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotice {
    /// The resource that changed.
    pub resource: SyncResource,
    /// Store version after the write.
    pub version: u64,
}

/// Errors from the purchase path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The machine does not carry this product.
    #[error("item not found: {0}")]
    UnknownProduct(String),

    /// The product has no stock left.
    #[error("item out of stock: {0}")]
    OutOfStock(String),
}

/// Result of one [`SimulationStore::commit_step`].
#[derive(Debug, Clone)]
pub struct CommitReceipt {
    /// Events as appended, in order, after validation.
    pub events: Vec<Event>,
    /// How many of them were downgraded to unknown.
    pub downgraded: usize,
    /// Store version after the commit.
    pub version: u64,
}

/// Result of [`SimulationStore::clear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ClearReceipt {
    /// Events removed from the log.
    pub cleared_events: usize,
    /// Step logs removed.
    pub cleared_logs: usize,
}

/// Everything a tick needs to decide, read in one lock acquisition.
#[derive(Debug, Clone)]
pub struct PlanningView {
    /// Inventory projection at read time.
    pub book: InventoryBook,
    /// Cash on hand.
    pub balance: Decimal,
    /// Most recent customer sales, oldest first.
    pub recent_sales: Vec<Transaction>,
    /// Most recent step logs, oldest first.
    pub recent_logs: Vec<StepLog>,
}

#[derive(Debug)]
struct StoreState {
    events: Vec<Event>,
    logs: Vec<StepLog>,
    book: InventoryBook,
    fold: LedgerFold,
    version: u64,
}

impl StoreState {
    fn seeded(seed: &[InventoryItem], initial_balance: Decimal) -> Self {
        Self {
            events: Vec::new(),
            logs: Vec::new(),
            book: InventoryBook::new(seed.iter().cloned()),
            fold: LedgerFold::new(initial_balance),
            version: 0,
        }
    }

    /// Validate, downgrade if needed, and append. Returns whether it was downgraded.
    fn append(&mut self, mut event: Event, touched: &mut BTreeSet<Resource>) -> (Event, bool) {
        let downgraded = match self.book.apply(&event.kind) {
            Ok(()) => false,
            Err(e) => {
                warn!(
                    event_id = %event.id,
                    event_type = event.kind.type_name(),
                    error = %e,
                    "event rejected by inventory, stored as unknown"
                );
                event.kind = downgrade(&event.kind, &e);
                true
            }
        };
        self.fold.apply(&event);
        touched.extend(affected(&event.kind));
        self.events.push(event.clone());
        (event, downgraded)
    }

    fn bump(&mut self) -> u64 {
        self.version = self.version.saturating_add(1);
        self.version
    }
}

/// Orderable wrapper so touched resources can live in a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Resource {
    Inventory,
    Ledger,
    Transactions,
}

impl Resource {
    const fn public(self) -> SyncResource {
        match self {
            Self::Inventory => SyncResource::Inventory,
            Self::Ledger => SyncResource::Ledger,
            Self::Transactions => SyncResource::Transactions,
        }
    }
}

const ALL_RESOURCES: [Resource; 3] = [Resource::Inventory, Resource::Ledger, Resource::Transactions];

const fn affected(kind: &EventKind) -> &'static [Resource] {
    match kind {
        EventKind::SoldToCustomer { .. } | EventKind::BoughtFromVendor { .. } => &ALL_RESOURCES,
        EventKind::PriceChange { .. } => &[Resource::Inventory, Resource::Transactions],
        EventKind::Unknown { .. } => &[],
    }
}

fn downgrade(kind: &EventKind, error: &LedgerError) -> EventKind {
    EventKind::Unknown {
        type_name: REJECTED_EVENT_TYPE.to_owned(),
        raw: json!({
            "type": kind.type_name(),
            "payload": kind.payload(),
            "reason": error.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The single writer for simulation state.
#[derive(Debug)]
pub struct SimulationStore {
    seed: Vec<InventoryItem>,
    initial_balance: Decimal,
    state: RwLock<StoreState>,
    notices: broadcast::Sender<ChangeNotice>,
}

impl SimulationStore {
    /// Create a store seeded with `seed` stock and `initial_balance` cash.
    pub fn new(seed: Vec<InventoryItem>, initial_balance: Decimal) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let state = StoreState::seeded(&seed, initial_balance);
        Self {
            seed,
            initial_balance,
            state: RwLock::new(state),
            notices,
        }
    }

    /// Subscribe to change notices.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.notices.subscribe()
    }

    fn publish(&self, touched: &BTreeSet<Resource>, version: u64) {
        for resource in touched {
            // Err only means nobody is listening.
            let _ = self.notices.send(ChangeNotice {
                resource: resource.public(),
                version,
            });
        }
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Append one step's events and its decision log in a single write.
    pub async fn commit_step(&self, events: Vec<Event>, log: Option<StepLog>) -> CommitReceipt {
        let mut touched = BTreeSet::new();
        let mut appended = Vec::with_capacity(events.len());
        let mut downgraded: usize = 0;

        let version = {
            let mut state = self.state.write().await;
            for event in events {
                let (event, was_downgraded) = state.append(event, &mut touched);
                if was_downgraded {
                    downgraded = downgraded.saturating_add(1);
                }
                appended.push(event);
            }
            if let Some(log) = log {
                state.logs.push(log);
            }
            state.bump()
        };

        debug!(events = appended.len(), downgraded, version, "step committed");
        self.publish(&touched, version);
        CommitReceipt {
            events: appended,
            downgraded,
            version,
        }
    }

    /// Append one externally produced event.
    pub async fn ingest(
        &self,
        kind: EventKind,
        agent_name: Option<String>,
        agent_response: Value,
    ) -> Event {
        let mut touched = BTreeSet::new();
        let (event, version) = {
            let mut state = self.state.write().await;
            let (event, _) = state.append(Event::new(kind, agent_name, agent_response), &mut touched);
            (event, state.bump())
        };
        info!(event_id = %event.id, event_type = event.kind.type_name(), version, "event ingested");
        self.publish(&touched, version);
        event
    }

    /// Sell one unit of `product` to a customer at its current retail price.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UnknownProduct`] or [`StoreError::OutOfStock`].
    /// Nothing is appended in either case.
    pub async fn record_sale(&self, product: &str) -> Result<Event, StoreError> {
        let mut touched = BTreeSet::new();
        let (event, version) = {
            let mut state = self.state.write().await;
            let item = state
                .book
                .get(product)
                .ok_or_else(|| StoreError::UnknownProduct(product.to_owned()))?;
            if item.quantity_in_stock == 0 {
                return Err(StoreError::OutOfStock(product.to_owned()));
            }
            let kind = EventKind::SoldToCustomer {
                product: product.to_owned(),
                amount: item.retail_price,
                quantity: 1,
            };
            let event = Event::new(
                kind,
                Some(CUSTOMER_AGENT.to_owned()),
                json!({"message": "purchase recorded"}),
            );
            let (event, _) = state.append(event, &mut touched);
            (event, state.bump())
        };
        info!(product, version, "customer purchase recorded");
        self.publish(&touched, version);
        Ok(event)
    }

    /// Reset the log and projections to the seed.
    pub async fn clear(&self) -> ClearReceipt {
        let (receipt, version) = {
            let mut state = self.state.write().await;
            let receipt = ClearReceipt {
                cleared_events: state.events.len(),
                cleared_logs: state.logs.len(),
            };
            // The version keeps counting so subscribers always see it move.
            let version = state.version;
            *state = StoreState::seeded(&self.seed, self.initial_balance);
            state.version = version;
            (receipt, state.bump())
        };
        info!(
            cleared_events = receipt.cleared_events,
            cleared_logs = receipt.cleared_logs,
            "store cleared"
        );
        self.publish(&ALL_RESOURCES.into_iter().collect(), version);
        receipt
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Read the decision context for one tick.
    pub async fn planning_view(&self, recent: usize) -> PlanningView {
        let state = self.state.read().await;
        let mut recent_sales: Vec<Transaction> = state
            .events
            .iter()
            .rev()
            .filter(|e| matches!(e.kind, EventKind::SoldToCustomer { .. }))
            .filter_map(Event::transaction)
            .take(recent)
            .collect();
        recent_sales.reverse();
        let skip = state.logs.len().saturating_sub(recent);
        PlanningView {
            book: state.book.clone(),
            balance: state.fold.balance(),
            recent_sales,
            recent_logs: state.logs.iter().skip(skip).cloned().collect(),
        }
    }

    /// Current inventory, ordered by product name.
    pub async fn inventory(&self) -> Vec<InventoryItem> {
        self.state.read().await.book.items()
    }

    /// Current financial snapshot.
    pub async fn snapshot(&self) -> FinancialSnapshot {
        self.state.read().await.fold.snapshot()
    }

    /// Current cash balance.
    pub async fn balance(&self) -> Decimal {
        self.state.read().await.fold.balance()
    }

    /// The derived cash account.
    pub async fn cash_account(&self) -> CashAccount {
        CashAccount {
            account_name: CASH_ACCOUNT_NAME.to_owned(),
            balance: self.balance().await,
        }
    }

    /// Transactions, newest first, at most `limit` when given.
    pub async fn transactions(&self, limit: Option<usize>) -> Vec<Transaction> {
        let state = self.state.read().await;
        state
            .events
            .iter()
            .rev()
            .filter_map(Event::transaction)
            .take(limit.unwrap_or(usize::MAX))
            .collect()
    }

    /// The full event log in append order.
    pub async fn events(&self) -> Vec<Event> {
        self.state.read().await.events.clone()
    }

    /// Step logs for one run, in step order.
    pub async fn logs(&self, run_id: RunId) -> Vec<StepLog> {
        let state = self.state.read().await;
        let mut logs: Vec<StepLog> = state
            .logs
            .iter()
            .filter(|l| l.run_id == run_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.step_number);
        logs
    }

    /// Sales statistics over the whole log.
    pub async fn metrics(&self) -> PerformanceMetrics {
        PerformanceMetrics::from_events(&self.state.read().await.events)
    }

    /// Value of the stock on hand.
    pub async fn valuation(&self) -> InventoryValuation {
        InventoryValuation::from_items(&self.inventory().await)
    }

    /// Monotonic write counter.
    pub async fn version(&self) -> u64 {
        self.state.read().await.version
    }
}
