//! Configuration loading and typed config structures for the Webvend simulation.
//!
//! The canonical configuration lives in `webvend-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, and provides a loader that reads, overrides, and validates it.
//! Every section has defaults, so an empty file is a valid configuration.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use webvend_relay::{BackendType, RelayConfig};
use webvend_types::InventoryItem;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but is not usable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level configuration.
///
/// Mirrors the structure of `webvend-config.yaml`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WebvendConfig {
    /// Scheduler and economy settings.
    #[serde(default)]
    pub simulation: SimulationSettings,

    /// Products the operator may stock, with their starting state.
    #[serde(default = "default_catalog")]
    pub catalog: Vec<CatalogEntry>,

    /// Inference provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for WebvendConfig {
    fn default() -> Self {
        Self {
            simulation: SimulationSettings::default(),
            catalog: default_catalog(),
            llm: LlmConfig::default(),
            server: ServerSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl WebvendConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `WEBVEND_PORT` overrides `server.port`
    /// - `WEBVEND_LLM_API_URL` overrides `llm.api_url`
    /// - `WEBVEND_LLM_MODEL` overrides `llm.model`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string. No environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] or [`ConfigError::Invalid`].
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides, for running without a file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if an override is malformed.
    pub fn from_env_defaults() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a key lookup (normally the process environment).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `WEBVEND_PORT` is not a port.
    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup("WEBVEND_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .map_err(|e| ConfigError::Invalid(format!("invalid WEBVEND_PORT: {e}")))?;
        }
        if let Some(url) = lookup("WEBVEND_LLM_API_URL") {
            self.llm.api_url = url;
        }
        if let Some(model) = lookup("WEBVEND_LLM_MODEL") {
            self.llm.model = model;
        }
        Ok(())
    }

    /// Check ranges and uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if sim.tick_interval_ms < 100 {
            return Err(ConfigError::Invalid(format!(
                "simulation.tick_interval_ms must be at least 100, got {}",
                sim.tick_interval_ms
            )));
        }
        if sim.step_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "simulation.step_timeout_ms must be positive".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&sim.customer_purchase_probability) {
            return Err(ConfigError::Invalid(format!(
                "simulation.customer_purchase_probability must be within 0..=1, got {}",
                sim.customer_purchase_probability
            )));
        }
        if sim.initial_balance.is_sign_negative() {
            return Err(ConfigError::Invalid(
                "simulation.initial_balance must not be negative".to_owned(),
            ));
        }
        if self.server.sync_poll_interval_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "server.sync_poll_interval_ms must be positive when set".to_owned(),
            ));
        }
        if self.catalog.is_empty() {
            return Err(ConfigError::Invalid("catalog must not be empty".to_owned()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for entry in &self.catalog {
            if !seen.insert(entry.product_name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate catalog product: {}",
                    entry.product_name
                )));
            }
            if entry.vendor_cost <= Decimal::ZERO || entry.retail_price <= Decimal::ZERO {
                return Err(ConfigError::Invalid(format!(
                    "catalog prices must be positive for {}",
                    entry.product_name
                )));
            }
        }
        Ok(())
    }

    /// Starting inventory derived from the catalog.
    pub fn seed_inventory(&self) -> Vec<InventoryItem> {
        self.catalog.iter().map(CatalogEntry::to_item).collect()
    }
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Scheduler and economy settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SimulationSettings {
    /// Milliseconds between automatic ticks while a run is active.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Wall-clock budget for one decision, in milliseconds.
    #[serde(default = "default_step_timeout_ms")]
    pub step_timeout_ms: u64,

    /// Cash on hand before any event.
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,

    /// Chance that a given in-stock product sells one unit per tick.
    #[serde(default = "default_customer_purchase_probability")]
    pub customer_purchase_probability: f64,

    /// Seed for customer demand. Random when absent.
    #[serde(default)]
    pub seed: Option<u64>,

    /// How many recent sales and decisions the prompt includes.
    #[serde(default = "default_recent_history")]
    pub recent_history: usize,

    /// Agent name recorded on operator events and step logs.
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Prompt template file. The built-in template is used when absent.
    #[serde(default)]
    pub prompt_template: Option<String>,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            step_timeout_ms: default_step_timeout_ms(),
            initial_balance: default_initial_balance(),
            customer_purchase_probability: default_customer_purchase_probability(),
            seed: None,
            recent_history: default_recent_history(),
            agent_name: default_agent_name(),
            prompt_template: None,
        }
    }
}

const fn default_tick_interval_ms() -> u64 {
    5000
}

const fn default_step_timeout_ms() -> u64 {
    30_000
}

const fn default_initial_balance() -> Decimal {
    Decimal::ONE_HUNDRED
}

const fn default_customer_purchase_probability() -> f64 {
    0.1
}

const fn default_recent_history() -> usize {
    5
}

fn default_agent_name() -> String {
    String::from("VendingMachine")
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// A product the vendor sells and the machine can stock.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    /// Unique product name.
    pub product_name: String,
    /// Unit cost from the vendor.
    pub vendor_cost: Decimal,
    /// Starting retail price.
    pub retail_price: Decimal,
    /// Units in the machine when a run starts.
    #[serde(default = "default_initial_stock")]
    pub initial_stock: u32,
}

impl CatalogEntry {
    fn new(name: &str, cost_cents: i64, retail_cents: i64) -> Self {
        Self {
            product_name: name.to_owned(),
            vendor_cost: Decimal::new(cost_cents, 2),
            retail_price: Decimal::new(retail_cents, 2),
            initial_stock: default_initial_stock(),
        }
    }

    /// The inventory slot this entry seeds.
    pub fn to_item(&self) -> InventoryItem {
        InventoryItem {
            product_name: self.product_name.clone(),
            vendor_cost: self.vendor_cost,
            retail_price: self.retail_price,
            quantity_in_stock: self.initial_stock,
        }
    }
}

const fn default_initial_stock() -> u32 {
    10
}

/// The standard vendor catalog.
pub fn default_catalog() -> Vec<CatalogEntry> {
    vec![
        CatalogEntry::new("Classic Cola", 50, 125),
        CatalogEntry::new("Potato Chips", 75, 150),
        CatalogEntry::new("Chocolate Bar", 65, 150),
        CatalogEntry::new("Diet Cola", 55, 125),
        CatalogEntry::new("Pretzels", 70, 150),
        CatalogEntry::new("Peanut Butter Cups", 80, 175),
        CatalogEntry::new("Bottled Water", 40, 100),
        CatalogEntry::new("Energy Drink", 150, 300),
        CatalogEntry::new("Gum", 25, 75),
    ]
}

// ---------------------------------------------------------------------------
// LLM
// ---------------------------------------------------------------------------

/// Inference provider settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LlmConfig {
    /// Wire protocol.
    #[serde(default)]
    pub backend: BackendType,

    /// Base API URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Default model id.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Upper bound on generated tokens per request.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::default(),
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl LlmConfig {
    /// Build the relay config, reading the key from `api_key_env`.
    ///
    /// A missing key yields an empty string; the provider will reject the
    /// first request, which surfaces as an upstream status error.
    pub fn relay_config(&self) -> RelayConfig {
        let api_key = std::env::var(&self.api_key_env).unwrap_or_default();
        RelayConfig::new(self.backend, &self.api_url, &api_key, &self.model)
            .with_max_tokens(self.max_tokens)
    }
}

fn default_api_url() -> String {
    String::from("https://openrouter.ai/api/v1")
}

fn default_model() -> String {
    String::from("openai/gpt-4o-mini")
}

fn default_api_key_env() -> String {
    String::from("OPEN_ROUTER_KEY")
}

const fn default_max_tokens() -> u32 {
    512
}

// ---------------------------------------------------------------------------
// Server / logging
// ---------------------------------------------------------------------------

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerSettings {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: String,
    /// TCP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Periodic refresh for sync sockets, in milliseconds. Push-only when absent.
    #[serde(default)]
    pub sync_poll_interval_ms: Option<u64>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sync_poll_interval_ms: None,
        }
    }
}

fn default_host() -> String {
    String::from("0.0.0.0")
}

const fn default_port() -> u16 {
    8000
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable multi-field lines.
    #[default]
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    String::from("info")
}
