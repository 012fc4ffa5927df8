//! State sync: live, read-only views of store resources.
//!
//! [`StateSync::subscribe`] returns a lazy stream for one resource. The
//! first item is always a full sync. After that, every change notice for
//! the resource triggers a full re-fetch from the store; notices carry no
//! data, so a client can never apply a partial or stale push. If the
//! notice channel lags, the stream resubscribes and resyncs once. An
//! optional poll interval re-fetches on a timer alongside the pushes.
//!
//! Each subscription fetches one view at a time, so its results complete
//! in the order they are delivered and the latest completion always wins.
//! Updates are stamped with a completion sequence shared by every
//! subscription and with the store version they observed. The store
//! version only grows, across clears too, so a client can use either
//! stamp to discard a stale frame.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};
use webvend_types::SyncResource;

use crate::store::{ChangeNotice, SimulationStore};

/// Why an update was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncReason {
    /// First item of a subscription.
    Initial,
    /// The resource changed.
    Change,
    /// The notice channel lagged and the view was rebuilt.
    Resync,
    /// Periodic refresh.
    Poll,
}

/// One full view of a resource.
#[derive(Debug, Clone, Serialize)]
pub struct SyncUpdate {
    /// The resource.
    pub resource: SyncResource,
    /// Why this update was sent.
    pub reason: SyncReason,
    /// Completion order across all subscriptions.
    pub sequence: u64,
    /// Store version observed by the fetch.
    pub version: u64,
    /// The full authoritative view.
    pub data: Value,
}

/// Factory for resource subscriptions.
#[derive(Debug, Clone)]
pub struct StateSync {
    store: Weak<SimulationStore>,
    poll_interval: Option<Duration>,
    sequence: Arc<AtomicU64>,
}

impl StateSync {
    /// Sync over `store`, push-only.
    pub fn new(store: &Arc<SimulationStore>) -> Self {
        Self {
            store: Arc::downgrade(store),
            poll_interval: None,
            sequence: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Also re-fetch every `interval`.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Live updates for `resource`.
    ///
    /// Ends when the store is dropped.
    pub fn subscribe(&self, resource: SyncResource) -> BoxStream<'static, SyncUpdate> {
        let rx = self.store.upgrade().map(|store| store.subscribe());
        let poll = self.poll_interval.map(|period| {
            let first = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
            let mut interval = tokio::time::interval_at(first, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });
        let cursor = Cursor {
            store: self.store.clone(),
            resource,
            sequence: Arc::clone(&self.sequence),
            rx,
            poll,
            pending: Some(SyncReason::Initial),
        };
        futures::stream::unfold(cursor, |mut cursor| async move {
            let update = cursor.next_update().await?;
            Some((update, cursor))
        })
        .boxed()
    }
}

async fn fetch(store: &SimulationStore, resource: SyncResource) -> (u64, Value) {
    let data = match resource {
        SyncResource::Inventory => json!({ "inventory": store.inventory().await }),
        SyncResource::Ledger => json!({ "ledger": store.snapshot().await }),
        SyncResource::Transactions => json!({ "transactions": store.transactions(None).await }),
    };
    // Read after the data: a newer version always comes with its own notice.
    (store.version().await, data)
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

struct Cursor {
    store: Weak<SimulationStore>,
    resource: SyncResource,
    sequence: Arc<AtomicU64>,
    rx: Option<broadcast::Receiver<ChangeNotice>>,
    poll: Option<Interval>,
    pending: Option<SyncReason>,
}

impl Cursor {
    async fn next_update(&mut self) -> Option<SyncUpdate> {
        let reason = match self.pending.take() {
            Some(reason) => reason,
            None => self.wait().await?,
        };
        let store = self.store.upgrade()?;
        let (version, data) = fetch(&store, self.resource).await;
        drop(store);

        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel).saturating_add(1);
        debug!(resource = ?self.resource, ?reason, sequence, version, "sync view fetched");
        Some(SyncUpdate {
            resource: self.resource,
            reason,
            sequence,
            version,
            data,
        })
    }

    /// Wait for the next reason to fetch. `None` ends the stream.
    async fn wait(&mut self) -> Option<SyncReason> {
        let resource = self.resource;
        let Self { rx, poll, store, .. } = self;
        let receiver = rx.as_mut()?;

        loop {
            let polled = async {
                match poll.as_mut() {
                    Some(interval) => {
                        interval.tick().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };
            let notice = tokio::select! {
                notice = receiver.recv() => notice,
                () = polled => return Some(SyncReason::Poll),
            };

            match notice {
                Ok(notice) if notice.resource == resource => {
                    // Coalesce whatever else is already queued.
                    loop {
                        match receiver.try_recv() {
                            Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
                        }
                    }
                    return Some(SyncReason::Change);
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(resource = ?resource, skipped, "sync subscriber lagged, resyncing");
                    *receiver = store.upgrade()?.subscribe();
                    return Some(SyncReason::Resync);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use rust_decimal::Decimal;
    use webvend_types::{EventKind, InventoryItem};

    use super::*;

    fn store() -> Arc<SimulationStore> {
        Arc::new(SimulationStore::new(
            vec![InventoryItem {
                product_name: "Gum".to_owned(),
                vendor_cost: Decimal::new(25, 2),
                retail_price: Decimal::new(75, 2),
                quantity_in_stock: 500,
            }],
            Decimal::ONE_HUNDRED,
        ))
    }

    fn reprice(price: i64) -> EventKind {
        EventKind::PriceChange {
            product: "Gum".to_owned(),
            price: Decimal::new(price, 2),
        }
    }

    #[tokio::test]
    async fn first_item_is_full_sync_then_changes() {
        let store = store();
        let sync = StateSync::new(&store);
        let mut updates = sync.subscribe(SyncResource::Inventory);

        let first = updates.next().await.unwrap();
        assert_eq!(first.reason, SyncReason::Initial);
        assert_eq!(first.data["inventory"][0]["retail_price"], 0.75);

        store.ingest(reprice(90), None, Value::Null).await;
        let second = updates.next().await.unwrap();
        assert_eq!(second.reason, SyncReason::Change);
        assert_eq!(second.data["inventory"][0]["retail_price"], 0.9);
        assert!(second.sequence > first.sequence);
        assert!(second.version > first.version);
    }

    #[tokio::test]
    async fn notices_for_other_resources_are_ignored() {
        let store = store();
        let sync = StateSync::new(&store);
        let mut ledger = sync.subscribe(SyncResource::Ledger);
        ledger.next().await.unwrap();

        // A price change does not touch the ledger.
        store.ingest(reprice(80), None, Value::Null).await;
        store.record_sale("Gum").await.unwrap();

        let update = ledger.next().await.unwrap();
        assert_eq!(update.reason, SyncReason::Change);
        assert_eq!(update.data["ledger"]["revenue"], 0.8);
    }

    #[tokio::test]
    async fn lagged_subscriber_resyncs_once() {
        let store = store();
        let sync = StateSync::new(&store);
        let mut updates = sync.subscribe(SyncResource::Transactions);
        updates.next().await.unwrap();

        for _ in 0..300 {
            store.record_sale("Gum").await.unwrap();
        }
        let update = updates.next().await.unwrap();
        assert_eq!(update.reason, SyncReason::Resync);
        assert_eq!(update.data["transactions"].as_array().unwrap().len(), 300);
    }

    #[tokio::test]
    async fn stamps_keep_growing_across_a_clear() {
        let store = store();
        let sync = StateSync::new(&store);
        let mut inventory = sync.subscribe(SyncResource::Inventory);
        let mut ledger = sync.subscribe(SyncResource::Ledger);

        let first = inventory.next().await.unwrap();
        ledger.next().await.unwrap();
        store.record_sale("Gum").await.unwrap();
        let sold = inventory.next().await.unwrap();
        store.clear().await;
        let cleared = inventory.next().await.unwrap();

        assert_eq!(cleared.data["inventory"][0]["quantity_in_stock"], 500);
        assert!(first.version < sold.version && sold.version < cleared.version);
        assert!(first.sequence < sold.sequence && sold.sequence < cleared.sequence);

        // The other subscription draws from the same sequence.
        let ledger_update = ledger.next().await.unwrap();
        assert!(ledger_update.sequence > cleared.sequence);
    }

    #[tokio::test]
    async fn stream_ends_when_store_is_dropped() {
        let store = store();
        let sync = StateSync::new(&store);
        let mut updates = sync.subscribe(SyncResource::Inventory);
        updates.next().await.unwrap();

        drop(store);
        assert!(updates.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn poll_refreshes_without_notices() {
        let store = store();
        let sync = StateSync::new(&store).with_poll_interval(Duration::from_secs(5));
        let mut updates = sync.subscribe(SyncResource::Ledger);
        updates.next().await.unwrap();

        let polled = updates.next().await.unwrap();
        assert_eq!(polled.reason, SyncReason::Poll);
        assert_eq!(polled.version, 0);
    }
}
