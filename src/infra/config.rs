//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. TRACKSYNC_CONFIG environment variable
//! 3. Default: config/dev.toml

use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SweepSection {
    /// Sweep cadence for the built-in interval trigger (seconds)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Shipments processed concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Pause between batches to bound upstream call rate (milliseconds)
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,
    /// Wall-clock budget for one sweep (seconds)
    #[serde(default = "default_budget_secs")]
    pub budget_secs: u64,
    /// Skip shipments younger than this, to avoid racing the booking pipeline (minutes)
    #[serde(default = "default_grace_period_mins")]
    pub grace_period_mins: i64,
    /// Global floor between poll attempts, regardless of policy (minutes)
    #[serde(default = "default_floor_mins")]
    pub floor_mins: i64,
}

fn default_interval_secs() -> u64 {
    300
}

fn default_batch_size() -> usize {
    10
}

fn default_batch_pause_ms() -> u64 {
    500
}

fn default_budget_secs() -> u64 {
    240
}

fn default_grace_period_mins() -> i64 {
    5
}

fn default_floor_mins() -> i64 {
    15
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            budget_secs: default_budget_secs(),
            grace_period_mins: default_grace_period_mins(),
            floor_mins: default_floor_mins(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EligibilitySection {
    /// Freight/LTL shipments are polled at most this often (hours)
    #[serde(default = "default_freight_hours")]
    pub freight_hours: i64,
    /// Couriers in transit / out for delivery (minutes)
    #[serde(default = "default_courier_active_mins")]
    pub courier_active_mins: i64,
    /// Any other non-terminal courier status (hours)
    #[serde(default = "default_courier_idle_hours")]
    pub courier_idle_hours: i64,
}

fn default_freight_hours() -> i64 {
    12
}

fn default_courier_active_mins() -> i64 {
    10
}

fn default_courier_idle_hours() -> i64 {
    6
}

impl Default for EligibilitySection {
    fn default() -> Self {
        Self {
            freight_hours: default_freight_hours(),
            courier_active_mins: default_courier_active_mins(),
            courier_idle_hours: default_courier_idle_hours(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DedupSection {
    /// Trailing window in which an identical status change is a duplicate (minutes)
    #[serde(default = "default_status_window_mins")]
    pub status_window_mins: i64,
    /// How many recent status events to inspect
    #[serde(default = "default_status_recent_limit")]
    pub status_recent_limit: usize,
    /// Timestamp tolerance for equal tracking updates (seconds)
    #[serde(default = "default_tracking_window_secs")]
    pub tracking_window_secs: i64,
    /// How many recent tracking events to inspect
    #[serde(default = "default_tracking_recent_limit")]
    pub tracking_recent_limit: usize,
}

fn default_status_window_mins() -> i64 {
    60
}

fn default_status_recent_limit() -> usize {
    5
}

fn default_tracking_window_secs() -> i64 {
    60
}

fn default_tracking_recent_limit() -> usize {
    50
}

impl Default for DedupSection {
    fn default() -> Self {
        Self {
            status_window_mins: default_status_window_mins(),
            status_recent_limit: default_status_recent_limit(),
            tracking_window_secs: default_tracking_window_secs(),
            tracking_recent_limit: default_tracking_recent_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    pub base_url: String,
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_provider_timeout_secs() -> u64 {
    30
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self { base_url: String::new(), timeout_secs: default_provider_timeout_secs(), api_key: None }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProvidersSection {
    #[serde(default)]
    pub eshipper: ProviderSection,
    #[serde(default)]
    pub freightcom: ProviderSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// JSON snapshot of all shipments
    #[serde(default = "default_shipments_file")]
    pub shipments_file: String,
    /// JSONL append-only event log
    #[serde(default = "default_events_file")]
    pub events_file: String,
}

fn default_shipments_file() -> String {
    "data/shipments.json".to_string()
}

fn default_events_file() -> String {
    "data/events.jsonl".to_string()
}

impl Default for StoreSection {
    fn default() -> Self {
        Self { shipments_file: default_shipments_file(), events_file: default_events_file() }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub sweep: SweepSection,
    #[serde(default)]
    pub eligibility: EligibilitySection,
    #[serde(default)]
    pub dedup: DedupSection,
    #[serde(default)]
    pub providers: ProvidersSection,
    #[serde(default)]
    pub store: StoreSection,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    sweep_interval_secs: u64,
    batch_size: usize,
    batch_pause_ms: u64,
    sweep_budget_secs: u64,
    grace_period_mins: i64,
    floor_mins: i64,
    freight_hours: i64,
    courier_active_mins: i64,
    courier_idle_hours: i64,
    status_window_mins: i64,
    status_recent_limit: usize,
    tracking_window_secs: i64,
    tracking_recent_limit: usize,
    eshipper: ProviderSection,
    freightcom: ProviderSection,
    shipments_file: String,
    events_file: String,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_interval_secs(),
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            sweep_budget_secs: default_budget_secs(),
            grace_period_mins: default_grace_period_mins(),
            floor_mins: default_floor_mins(),
            freight_hours: default_freight_hours(),
            courier_active_mins: default_courier_active_mins(),
            courier_idle_hours: default_courier_idle_hours(),
            status_window_mins: default_status_window_mins(),
            status_recent_limit: default_status_recent_limit(),
            tracking_window_secs: default_tracking_window_secs(),
            tracking_recent_limit: default_tracking_recent_limit(),
            eshipper: ProviderSection::default(),
            freightcom: ProviderSection::default(),
            shipments_file: default_shipments_file(),
            events_file: default_events_file(),
            config_file: "default".to_string(),
        }
    }
}

impl Config {
    /// Determine the config file path: an explicit CLI override wins, then
    /// the TRACKSYNC_CONFIG environment variable, then the default.
    pub fn resolve_config_path(cli_override: Option<String>) -> String {
        if let Some(path) = cli_override {
            return path;
        }
        if let Ok(path) = env::var("TRACKSYNC_CONFIG") {
            return path;
        }
        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self {
            sweep_interval_secs: toml_config.sweep.interval_secs,
            batch_size: toml_config.sweep.batch_size,
            batch_pause_ms: toml_config.sweep.batch_pause_ms,
            sweep_budget_secs: toml_config.sweep.budget_secs,
            grace_period_mins: toml_config.sweep.grace_period_mins,
            floor_mins: toml_config.sweep.floor_mins,
            freight_hours: toml_config.eligibility.freight_hours,
            courier_active_mins: toml_config.eligibility.courier_active_mins,
            courier_idle_hours: toml_config.eligibility.courier_idle_hours,
            status_window_mins: toml_config.dedup.status_window_mins,
            status_recent_limit: toml_config.dedup.status_recent_limit,
            tracking_window_secs: toml_config.dedup.tracking_window_secs,
            tracking_recent_limit: toml_config.dedup.tracking_recent_limit,
            eshipper: toml_config.providers.eshipper,
            freightcom: toml_config.providers.freightcom,
            shipments_file: toml_config.store.shipments_file,
            events_file: toml_config.store.events_file,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    // Getters for all config fields
    pub fn sweep_interval_secs(&self) -> u64 {
        self.sweep_interval_secs
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_pause_ms(&self) -> u64 {
        self.batch_pause_ms
    }

    pub fn sweep_budget_secs(&self) -> u64 {
        self.sweep_budget_secs
    }

    pub fn grace_period_mins(&self) -> i64 {
        self.grace_period_mins
    }

    pub fn floor_mins(&self) -> i64 {
        self.floor_mins
    }

    pub fn freight_hours(&self) -> i64 {
        self.freight_hours
    }

    pub fn courier_active_mins(&self) -> i64 {
        self.courier_active_mins
    }

    pub fn courier_idle_hours(&self) -> i64 {
        self.courier_idle_hours
    }

    pub fn status_window_mins(&self) -> i64 {
        self.status_window_mins
    }

    pub fn status_recent_limit(&self) -> usize {
        self.status_recent_limit
    }

    pub fn tracking_window_secs(&self) -> i64 {
        self.tracking_window_secs
    }

    pub fn tracking_recent_limit(&self) -> usize {
        self.tracking_recent_limit
    }

    pub fn eshipper(&self) -> &ProviderSection {
        &self.eshipper
    }

    pub fn freightcom(&self) -> &ProviderSection {
        &self.freightcom
    }

    pub fn shipments_file(&self) -> &str {
        &self.shipments_file
    }

    pub fn events_file(&self) -> &str {
        &self.events_file
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    // Builder-style overrides for tests
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_batch_pause_ms(mut self, batch_pause_ms: u64) -> Self {
        self.batch_pause_ms = batch_pause_ms;
        self
    }

    pub fn with_sweep_budget_secs(mut self, budget_secs: u64) -> Self {
        self.sweep_budget_secs = budget_secs;
        self
    }

    pub fn with_floor_mins(mut self, floor_mins: i64) -> Self {
        self.floor_mins = floor_mins;
        self
    }

    pub fn with_grace_period_mins(mut self, grace_period_mins: i64) -> Self {
        self.grace_period_mins = grace_period_mins;
        self
    }

    pub fn with_store_files(mut self, shipments_file: &str, events_file: &str) -> Self {
        self.shipments_file = shipments_file.to_string();
        self.events_file = events_file.to_string();
        self
    }
}
