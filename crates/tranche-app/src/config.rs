//! Application configuration.
//!
//! Loaded from a TOML file and layered with `TRANCHE__SECTION__KEY`
//! environment overrides (e.g. `TRANCHE__BROKER__TOKEN`).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tranche_broker::{BackoffPolicy, SubmissionConfig};
use tranche_core::{TimeResolution, VenueClock};
use tranche_dispatch::DispatcherConfig;
use tranche_registry::InstrumentSeed;

use crate::error::{AppError, AppResult};

/// Default configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

// ============================================================================
// Scheduler
// ============================================================================

/// Dispatcher and background task settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Dispatcher tick (ms). Default: 1,000.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Delay inside each dispatch task before the broker call (ms). Default: 50.
    #[serde(default = "default_pre_submit_delay_ms")]
    pub pre_submit_delay_ms: u64,
    /// Concurrent broker submissions. Default: 16.
    #[serde(default = "default_worker_permits")]
    pub worker_permits: usize,
    /// Pending index bucket size.
    #[serde(default)]
    pub resolution: TimeResolution,
    /// Venue UTC offset, e.g. `+03:00`.
    #[serde(default = "default_venue_utc_offset")]
    pub venue_utc_offset: String,
    /// Broker status polling interval (s). 0 disables. Default: 30.
    #[serde(default = "default_status_sync_interval_secs")]
    pub status_sync_interval_secs: u64,
    /// Session limits refresh interval (s). 0 disables. Default: 300.
    #[serde(default = "default_limits_refresh_interval_secs")]
    pub limits_refresh_interval_secs: u64,
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_pre_submit_delay_ms() -> u64 {
    50
}

fn default_worker_permits() -> usize {
    16
}

fn default_venue_utc_offset() -> String {
    "+03:00".to_string()
}

fn default_status_sync_interval_secs() -> u64 {
    30
}

fn default_limits_refresh_interval_secs() -> u64 {
    300
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            pre_submit_delay_ms: default_pre_submit_delay_ms(),
            worker_permits: default_worker_permits(),
            resolution: TimeResolution::default(),
            venue_utc_offset: default_venue_utc_offset(),
            status_sync_interval_secs: default_status_sync_interval_secs(),
            limits_refresh_interval_secs: default_limits_refresh_interval_secs(),
        }
    }
}

impl SchedulerConfig {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            pre_submit_delay: Duration::from_millis(self.pre_submit_delay_ms),
            worker_permits: self.worker_permits,
        }
    }

    pub fn venue_clock(&self) -> AppResult<VenueClock> {
        VenueClock::from_offset_str(&self.venue_utc_offset)
            .map_err(|e| AppError::Config(e.to_string()))
    }
}

// ============================================================================
// Broker
// ============================================================================

/// Broker connection and retry settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// REST gateway root URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// API token. Prefer `TRANCHE__BROKER__TOKEN` over the file.
    #[serde(default, skip_serializing)]
    pub token: String,
    /// Account used by instructions that leave `account_id` empty.
    #[serde(default)]
    pub account_id: String,
    /// Acknowledge every order locally instead of calling the broker.
    #[serde(default)]
    pub dry_run: bool,
    /// Attempts per submission. Default: 3.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Per-call timeout (ms). Default: 10,000.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// First retry delay (ms). Default: 250.
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,
    /// Retry delay cap (ms). Default: 5,000.
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: u32,
    #[serde(default)]
    pub backoff_jitter: bool,
}

fn default_base_url() -> String {
    "https://invest-public-api.tinkoff.ru/rest".to_string()
}

fn default_max_attempts() -> u32 {
    3
}

fn default_call_timeout_ms() -> u64 {
    10_000
}

fn default_backoff_initial_ms() -> u64 {
    250
}

fn default_backoff_max_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> u32 {
    2
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: String::new(),
            account_id: String::new(),
            dry_run: false,
            max_attempts: default_max_attempts(),
            call_timeout_ms: default_call_timeout_ms(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            backoff_jitter: false,
        }
    }
}

impl std::fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("base_url", &self.base_url)
            .field("token", &if self.token.is_empty() { "<unset>" } else { "***" })
            .field("account_id", &self.account_id)
            .field("dry_run", &self.dry_run)
            .field("max_attempts", &self.max_attempts)
            .field("call_timeout_ms", &self.call_timeout_ms)
            .finish_non_exhaustive()
    }
}

impl BrokerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    pub fn submission_config(&self) -> SubmissionConfig {
        SubmissionConfig {
            max_attempts: self.max_attempts,
            call_timeout: self.call_timeout(),
            backoff: BackoffPolicy {
                initial: Duration::from_millis(self.backoff_initial_ms),
                max: Duration::from_millis(self.backoff_max_ms),
                multiplier: self.backoff_multiplier,
                jitter: self.backoff_jitter,
            },
        }
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Snapshot path for the file backend.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data/orders.json".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

// ============================================================================
// Telemetry
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON log output (also enabled by `RUST_ENV=production`).
    #[serde(default)]
    pub json_logs: bool,
    /// Serve `/metrics` on this port when set.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info,tranche=debug".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            metrics_port: None,
        }
    }
}

// ============================================================================
// AppConfig
// ============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Static instrument reference data.
    #[serde(default)]
    pub instruments: Vec<InstrumentSeed>,
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Path priority: `path` argument > `config/default.toml`.
    /// A missing default file falls back to built-in defaults plus
    /// environment overrides; a missing explicit file is an error.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH)?,
            None => {
                tracing::warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Self::build(None)?
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file plus environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        if !Path::new(path).exists() {
            return Err(AppError::Config(format!("config file not found: {path}")));
        }
        Self::build(Some(path))
    }

    /// Parse a TOML string without environment overrides.
    pub fn from_toml_str(content: &str) -> AppResult<Self> {
        let config = Config::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    fn build(path: Option<&str>) -> AppResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }
        let config = builder
            .add_source(
                Environment::with_prefix("TRANCHE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> AppResult<()> {
        if self.scheduler.tick_interval_ms == 0 {
            return Err(AppError::Config("scheduler.tick_interval_ms must be > 0".into()));
        }
        if self.scheduler.worker_permits == 0 {
            return Err(AppError::Config("scheduler.worker_permits must be > 0".into()));
        }
        self.scheduler.venue_clock()?;

        if self.broker.max_attempts == 0 {
            return Err(AppError::Config("broker.max_attempts must be > 0".into()));
        }
        if self.broker.call_timeout_ms == 0 {
            return Err(AppError::Config("broker.call_timeout_ms must be > 0".into()));
        }
        if !self.broker.dry_run && self.broker.token.is_empty() {
            return Err(AppError::Config(
                "broker.token is required unless broker.dry_run is set".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tranche_core::InstrumentId;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.worker_permits, 16);
        assert_eq!(config.scheduler.venue_utc_offset, "+03:00");
        assert_eq!(config.broker.max_attempts, 3);
        assert_eq!(config.store.backend, StoreBackend::File);

        let submission = config.broker.submission_config();
        assert_eq!(submission.backoff, BackoffPolicy::default());
        assert_eq!(submission.call_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            [scheduler]
            worker_permits = 4
            resolution = "minute"

            [broker]
            dry_run = true

            [store]
            backend = "memory"

            [[instruments]]
            id = "BBG004730N88"
            name = "SBER"
            tick_size = "0.01"
            lot_size = 10
            close = "250.00"
        "#;

        let config = AppConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.scheduler.worker_permits, 4);
        assert_eq!(config.scheduler.resolution, TimeResolution::Minute);
        assert_eq!(config.scheduler.tick_interval_ms, 1_000);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.instruments.len(), 1);
        assert_eq!(config.instruments[0].id, InstrumentId::from("BBG004730N88"));
        assert_eq!(config.instruments[0].tick_size.inner(), dec!(0.01));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_token() {
        let config = AppConfig::default();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = AppConfig::default();
        config.broker.token = "t.secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_offset() {
        let mut config = AppConfig::default();
        config.broker.dry_run = true;
        config.scheduler.venue_utc_offset = "moscow".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_hides_token() {
        let mut config = AppConfig::default();
        config.broker.token = "t.secret".to_string();
        assert!(!format!("{config:?}").contains("t.secret"));
    }

    #[test]
    fn test_serializes_without_token() {
        let mut config = AppConfig::default();
        config.broker.token = "t.secret".to_string();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("worker_permits"));
        assert!(!toml_str.contains("t.secret"));
    }
}
