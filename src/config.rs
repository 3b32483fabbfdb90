//! Configuration for the ingestion service.
//!
//! Values come from three layers, later ones winning:
//!
//! 1. built-in defaults
//! 2. an optional YAML file ([`AppConfig::from_yaml_file`])
//! 3. environment variables ([`AppConfig::apply_env`])
//!
//! ```yaml
//! telemetry:
//!   listen_addr: "0.0.0.0:8000"
//!   checkpoint_interval_ms: 5000
//! storage:
//!   kind: jsonl
//!   data_dir: /var/lib/forza-telemetry
//! log_level: info
//! shutdown_timeout_ms: 10000
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{Result, TelemetryError};

/// Default UDP listen address.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

/// Default checkpoint interval.
pub const DEFAULT_CHECKPOINT_INTERVAL: Duration = Duration::from_secs(5);

/// Per-session queue depth. About one second of samples at 60Hz.
pub const DEFAULT_QUEUE_CAPACITY: usize = 60;

/// Pre-sized session buffer. 60Hz for 5s is 300 samples, plus margin so the
/// buffer never grows between checkpoints.
pub const DEFAULT_BUFFER_CAPACITY: usize = 350;

/// Default graceful shutdown deadline.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Listener and session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    #[serde(rename = "checkpoint_interval_ms", with = "duration_ms")]
    pub checkpoint_interval: Duration,
    pub queue_capacity: usize,
    pub buffer_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Config listening on `addr` with the given checkpoint interval.
    ///
    /// An empty address falls back to [`DEFAULT_LISTEN_ADDR`].
    pub fn new(addr: impl Into<String>, checkpoint_interval: Duration) -> Self {
        let mut config = Self { listen_addr: addr.into(), checkpoint_interval, ..Self::default() };
        if config.listen_addr.trim().is_empty() {
            config.listen_addr = DEFAULT_LISTEN_ADDR.to_string();
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.checkpoint_interval.is_zero() {
            return Err(TelemetryError::config("telemetry", "checkpoint interval must be positive"));
        }
        if self.queue_capacity == 0 {
            return Err(TelemetryError::config("telemetry", "queue capacity must be positive"));
        }
        if self.buffer_capacity == 0 {
            return Err(TelemetryError::config("telemetry", "buffer capacity must be positive"));
        }
        Ok(())
    }
}

/// Which storage backend to use.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum StorageConfig {
    #[default]
    Memory,
    Jsonl {
        data_dir: PathBuf,
    },
}

/// Whole-process configuration for the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub telemetry: ServerConfig,
    pub storage: StorageConfig,
    pub log_level: String,
    #[serde(rename = "shutdown_timeout_ms", with = "duration_ms")]
    pub shutdown_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            telemetry: ServerConfig::default(),
            storage: StorageConfig::default(),
            log_level: "info".to_string(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl AppConfig {
    /// Parse a YAML document. Missing keys keep their defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: AppConfig = serde_yaml_ng::from_str(yaml)
            .map_err(|e| TelemetryError::config("YAML configuration", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TelemetryError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml(&yaml)
    }

    /// Apply `TELEMETRY_ADDR`, `DATA_DIR` and `LOG_LEVEL` overrides.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from any key lookup; used by [`apply_env`](Self::apply_env).
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("TELEMETRY_ADDR").filter(|v| !v.trim().is_empty()) {
            self.telemetry.listen_addr = addr;
        }
        if let Some(dir) = lookup("DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.storage = StorageConfig::Jsonl { data_dir: PathBuf::from(dir) };
        }
        if let Some(level) = lookup("LOG_LEVEL").filter(|v| !v.trim().is_empty()) {
            self.log_level = level;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.telemetry.validate()?;
        if self.shutdown_timeout.is_zero() {
            return Err(TelemetryError::config("shutdown", "shutdown timeout must be positive"));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
