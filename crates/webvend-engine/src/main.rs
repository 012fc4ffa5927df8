//! Webvend engine binary.
//!
//! Loads configuration, initializes logging, wires the event store, the
//! inference relay, and the step scheduler together, and serves the API.
//! No run starts on its own; the operator starts one over HTTP.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `WEBVEND_CONFIG` (default `webvend-config.yaml`)
//! 2. Initialize structured logging (tracing)
//! 3. Seed the store from the catalog
//! 4. Create the relay and the scheduler
//! 5. Serve the API until Ctrl-C, then pause any active run

mod error;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use webvend_core::config::{LogFormat, LoggingConfig};
use webvend_core::{
    DecisionSource, PromptEngine, SchedulerSettings, SimulationStore, StateSync, StepScheduler,
    WebvendConfig,
};
use webvend_observer::{AppState, ServerConfig};
use webvend_relay::InferenceRelay;

use crate::error::EngineError;

/// Config file used when `WEBVEND_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "webvend-config.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config_path =
        std::env::var("WEBVEND_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    let config = load_config(Path::new(&config_path))
        .with_context(|| format!("loading configuration from {config_path}"))?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging).context("initializing logging")?;
    info!(
        config_path = %config_path,
        tick_interval_ms = config.simulation.tick_interval_ms,
        step_timeout_ms = config.simulation.step_timeout_ms,
        products = config.catalog.len(),
        "webvend-engine starting"
    );

    // 3-4. Store, relay, scheduler.
    let state = build_state(&config).context("building application state")?;

    // 5. Serve.
    let server = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
    };
    webvend_observer::start_server(&server, Arc::new(state), shutdown_signal())
        .await
        .map_err(EngineError::from)
        .context("serving the API")?;

    info!("webvend-engine shutdown complete");
    Ok(())
}

/// Resolve on Ctrl-C.
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(e) => {
            // Without a handler, serve until the process is killed.
            warn!(error = %e, "could not listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}

/// Load the config file, or defaults when it does not exist.
fn load_config(path: &Path) -> Result<WebvendConfig, EngineError> {
    let config = if path.exists() {
        WebvendConfig::from_file(path)?
    } else {
        WebvendConfig::from_env_defaults()?
    };
    Ok(config)
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
fn init_tracing(logging: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .map_err(|e| EngineError::Logging {
            message: format!("invalid log filter: {e}"),
        })?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match logging.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}

fn build_state(config: &WebvendConfig) -> Result<AppState, EngineError> {
    let store = Arc::new(SimulationStore::new(
        config.seed_inventory(),
        config.simulation.initial_balance,
    ));
    info!(
        balance = %config.simulation.initial_balance,
        "event store seeded"
    );

    let relay_config = config.llm.relay_config();
    if relay_config.api_key.is_empty() {
        warn!(
            api_key_env = %config.llm.api_key_env,
            "no API key set, provider requests will likely be refused"
        );
    }
    let relay = Arc::new(InferenceRelay::new(relay_config));
    info!(
        backend = config.llm.backend.name(),
        api_url = %config.llm.api_url,
        model = %config.llm.model,
        "inference relay configured"
    );

    let prompts = match config.simulation.prompt_template.as_deref() {
        Some(path) => {
            info!(path, "using prompt template file");
            PromptEngine::from_file(Path::new(path))?
        }
        None => PromptEngine::new()?,
    };

    let decisions: Arc<dyn DecisionSource> = relay.clone();
    let scheduler = Arc::new(StepScheduler::new(
        decisions,
        store,
        prompts,
        SchedulerSettings::from_config(config),
    ));

    let state = AppState::new(scheduler, relay);
    let state = match config.server.sync_poll_interval_ms {
        Some(ms) => {
            let sync = StateSync::new(&state.store).with_poll_interval(Duration::from_millis(ms));
            state.with_sync(sync)
        }
        None => state,
    };
    Ok(state)
}
