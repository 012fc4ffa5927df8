//! HTTP and `WebSocket` API for the Webvend simulation.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **Simulation control** (`/api/simulation/*`) driving the
//!   [`StepScheduler`](webvend_core::StepScheduler)
//! - **Vending reads** (`/api/vending/*`) over the event store projections
//! - **Inference relay** (`/api/relay`) streaming model output as it arrives
//! - **Webhook ingestion** (`/api/webhook/events`) for external events
//! - **Live sync** (`/ws/sync/{resource}`) pushing full views on change
//!
//! Every handler goes through the shared [`AppState`]. Nothing here holds
//! simulation state of its own.

pub mod error;
pub mod handlers;
pub mod operator;
pub mod relay;
pub mod router;
pub mod server;
pub mod state;
pub mod webhook;
pub mod ws;

pub use error::ObserverError;
pub use router::build_router;
pub use server::{ServerConfig, ServerError, bind, serve, start_server};
pub use state::AppState;
