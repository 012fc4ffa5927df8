//! Simulation core for Webvend.
//!
//! Runs the vending machine operator loop: read the state, ask a model what
//! to do, turn the answer into events, and append them to the store. Also
//! exposes the store to readers through [`sync::StateSync`].
//!
//! # Modules
//!
//! - [`config`] -- YAML configuration with defaults and environment overrides
//! - [`store`] -- In-memory event log, step logs, and projections
//! - [`decision`] -- The [`decision::DecisionSource`] seam and a scripted stub
//! - [`prompt`] -- Decision prompt rendering
//! - [`parse`] -- Model response parsing into actions
//! - [`actions`] -- Action resolution and customer demand
//! - [`scheduler`] -- The [`scheduler::StepScheduler`] run lifecycle and tick
//! - [`sync`] -- Full-view change subscriptions
//! - [`webhook`] -- External event envelope parsing

pub mod actions;
pub mod config;
pub mod decision;
pub mod parse;
pub mod prompt;
pub mod scheduler;
pub mod store;
pub mod sync;
pub mod webhook;

pub use config::{ConfigError, WebvendConfig};
pub use decision::{DecisionError, DecisionSource, StubDecisionSource};
pub use prompt::PromptEngine;
pub use scheduler::{SchedulerError, SchedulerSettings, SchedulerStatus, StepScheduler, TickOutcome};
pub use store::{ClearReceipt, SimulationStore, StoreError};
pub use sync::{StateSync, SyncUpdate};
