//! Watch configuration.
//!
//! A single YAML document describes the devices that can be reached, the
//! watchers bound to them and the registries used for update detection.

use crate::error::{Result, WatchError};
use crate::schedule::parse_cron;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default primary reconciliation schedule (top of every hour)
pub const DEFAULT_CRON: &str = "0 * * * *";

/// Default stats collection schedule (every minute)
pub const DEFAULT_STATS_CRON: &str = "*/1 * * * *";

/// Quiet window for coalescing create/destroy event bursts
pub const DEFAULT_DEBOUNCE_MS: u64 = 5000;

/// Delay before the first reconciliation after a watcher starts
pub const DEFAULT_WARMUP_MS: u64 = 1000;

/// Default per-watcher fan-out cap
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: LogLevel,

    /// Maximum concurrent per-container checks within one cycle
    pub concurrency: usize,

    /// Debounce window for event-triggered cycles (milliseconds)
    pub debounce_ms: u64,

    /// Warm-up delay before the first cycle (milliseconds)
    pub warmup_ms: u64,

    /// Known devices
    pub devices: Vec<DeviceConfig>,

    /// Watchers, one per monitored device
    pub watchers: Vec<WatcherConfig>,

    /// Registry providers
    pub registries: Vec<RegistryEntry>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            concurrency: DEFAULT_CONCURRENCY,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            warmup_ms: DEFAULT_WARMUP_MS,
            devices: Vec::new(),
            watchers: Vec::new(),
            registries: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Default config location (`~/.a3s/watch.yaml`).
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".a3s")
            .join("watch.yaml")
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WatchError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(raw: &str) -> Result<Self> {
        let config: WatchConfig = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check process-wide settings. Watchers and registries are validated
    /// individually when they register.
    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(WatchError::invalid_field("config", "concurrency"));
        }
        Ok(())
    }
}

/// A device reachable through a Docker-compatible engine API
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Device identifier referenced by watchers
    pub uuid: String,

    /// Device address
    pub ip: String,

    #[serde(default)]
    pub hostname: Option<String>,

    /// Engine endpoint; defaults to `http://<ip>:2375`
    #[serde(default)]
    pub engine_url: Option<String>,

    /// Basic credentials for an authenticating engine proxy
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// Watcher configuration supplied at registration time
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Watcher name, unique among watchers
    pub name: String,

    /// Device to watch
    pub device_uuid: String,

    /// Primary reconciliation schedule
    pub cron: String,

    /// Collect container stats
    pub watch_stats: bool,

    /// Stats collection schedule
    pub stats_cron: String,

    /// Watch containers without an explicit `wud.watch` label
    pub watch_by_default: bool,

    /// List containers in every state, not only running ones
    pub watch_all: bool,

    /// Subscribe to the engine event stream
    pub watch_events: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            name: "local".to_string(),
            device_uuid: String::new(),
            cron: DEFAULT_CRON.to_string(),
            watch_stats: true,
            stats_cron: DEFAULT_STATS_CRON.to_string(),
            watch_by_default: true,
            watch_all: true,
            watch_events: true,
        }
    }
}

impl WatcherConfig {
    /// Validate every field, reporting all offending ones at once.
    pub fn validate(&self, component: &str) -> Result<()> {
        let mut fields = Vec::new();
        if self.name.trim().is_empty() {
            fields.push("name".to_string());
        }
        if self.device_uuid.trim().is_empty() {
            fields.push("device_uuid".to_string());
        }
        if let Err(e) = parse_cron(&self.cron) {
            fields.push(format!("cron ({})", e));
        }
        if self.watch_stats {
            if let Err(e) = parse_cron(&self.stats_cron) {
                fields.push(format!("stats_cron ({})", e));
            }
        }
        if fields.is_empty() {
            Ok(())
        } else {
            Err(WatchError::ConfigValidation {
                component: component.to_string(),
                fields,
            })
        }
    }
}

/// A registry provider declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEntry {
    /// Provider identifier (`hub`, `ecr`, `quay`, ...)
    pub provider: String,

    /// Instance name
    pub name: String,

    /// Provider-specific credential bag
    #[serde(default)]
    pub config: serde_json::Value,
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string for an `EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}
