use crate::attribution::{SchedulerConfig, DEFAULT_MAX_ENTRIES};
use crate::session::DEFAULT_LOG_CAPACITY;
use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub monitor: MonitorConfig,
    pub attribution: AttributionConfig,
    pub source: SourceConfig,

    /// Display names for client ids
    pub names: Vec<NameEntry>,
}

/// Entries are a list rather than a table because the config crate
/// lowercases table keys
#[derive(Debug, Clone, Deserialize)]
pub struct NameEntry {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "mic-guardian".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Sessions kept in memory (default: 100)
    pub log_capacity: usize,

    /// Clients never counted as recording, e.g. our own process
    pub ignored_clients: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_capacity: DEFAULT_LOG_CAPACITY,
            ignored_clients: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Run `attribution.command`
    Command,
    /// Foreground lists from the replay script
    Replay,
    /// No attribution; every participant ends up INACTIVE
    #[serde(rename = "none")]
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AttributionConfig {
    pub kind: ProviderKind,
    pub poll_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub poll_timeout_ms: u64,
    pub window_ms: u64,
    pub max_entries: usize,
    pub command: Vec<String>,
}

impl Default for AttributionConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Disabled,
            poll_interval_ms: 1000,
            heartbeat_interval_ms: 5000,
            poll_timeout_ms: 2000,
            window_ms: 10_000,
            max_entries: DEFAULT_MAX_ENTRIES,
            command: Vec::new(),
        }
    }
}

impl AttributionConfig {
    pub fn scheduler(&self) -> SchedulerConfig {
        SchedulerConfig {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            heartbeat_interval: Duration::from_millis(self.heartbeat_interval_ms.max(1)),
            poll_timeout: Duration::from_millis(self.poll_timeout_ms.max(1)),
            window: Duration::from_millis(self.window_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// PulseAudio / PipeWire via `pactl`
    Pactl,
    /// JSON-lines script at `source.script`
    Replay,
    /// Events pushed through a `SourceHandle`
    Manual,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub poll_interval_ms: u64,
    pub script: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Pactl,
            poll_interval_ms: 500,
            script: None,
        }
    }
}

impl Config {
    pub fn name_table(&self) -> Vec<(String, String)> {
        self.names
            .iter()
            .map(|entry| (entry.id.clone(), entry.name.clone()))
            .collect()
    }

    /// Load from `path` (any format the config crate knows, extension
    /// optional, file optional) with `GUARDIAN__SECTION__KEY` env overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("GUARDIAN").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
