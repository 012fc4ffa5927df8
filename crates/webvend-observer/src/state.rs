//! Shared application state for the API server.
//!
//! [`AppState`] bundles the scheduler, the store it writes to, the relay used
//! for free-form queries, and the sync factory behind the `WebSocket` route.
//! Handlers receive it as `State<Arc<AppState>>`.

use std::sync::Arc;

use webvend_core::{SimulationStore, StateSync, StepScheduler};
use webvend_relay::InferenceRelay;

/// Everything the handlers need.
#[derive(Debug)]
pub struct AppState {
    /// Run lifecycle and ticking.
    pub scheduler: Arc<StepScheduler>,
    /// Event log and projections.
    pub store: Arc<SimulationStore>,
    /// Streaming relay to the model provider.
    pub relay: Arc<InferenceRelay>,
    /// Live view subscriptions.
    pub sync: StateSync,
    /// Model used when a start request names none.
    pub default_model: String,
}

impl AppState {
    /// Build the state around a scheduler and relay.
    ///
    /// The store is the scheduler's own, so every route sees the same log.
    pub fn new(scheduler: Arc<StepScheduler>, relay: Arc<InferenceRelay>) -> Self {
        let store = Arc::clone(scheduler.store());
        let sync = StateSync::new(&store);
        let default_model = relay.config().model.clone();
        Self {
            scheduler,
            store,
            relay,
            sync,
            default_model,
        }
    }

    /// Replace the sync factory, e.g. to enable polling.
    #[must_use]
    pub fn with_sync(mut self, sync: StateSync) -> Self {
        self.sync = sync;
        self
    }
}
