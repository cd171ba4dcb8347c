//! Configuration schema for relprov
//!
//! Configuration is stored at `~/.config/relprov/config.toml`

use crate::eventlog::DeviceType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Progress output
    pub event_log: EventLogConfig,

    /// Record repositories and blobstore locations
    pub storage: StorageConfig,

    /// Agent endpoint
    pub agent: AgentConfig,

    /// Compilation tuning
    pub compiler: CompilerConfig,
}

/// General application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Format of diagnostics written to stderr
    pub log_format: LogFormat,
}

/// Diagnostic log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventLogConfig {
    pub device: DeviceType,
}

/// Where records and blobs live
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Parent of the `packages` and `compiled_packages` repositories
    pub repos_dir: PathBuf,

    /// Local blobstore directory
    pub blobstore_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let state = super::ConfigManager::state_dir();
        Self {
            repos_dir: state.join("repos"),
            blobstore_dir: state.join("blobs"),
        }
    }
}

impl StorageConfig {
    pub fn packages_dir(&self) -> PathBuf {
        self.repos_dir.join("packages")
    }

    pub fn compiled_packages_dir(&self) -> PathBuf {
        self.repos_dir.join("compiled_packages")
    }
}

/// Agent connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub url: String,

    /// Per HTTP round-trip
    pub timeout_secs: u64,

    /// Delay between task polls
    pub poll_interval_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:6868".to_string(),
            timeout_secs: 600,
            poll_interval_ms: 500,
        }
    }
}

impl AgentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// 1 compiles strictly in order
    pub max_concurrency: usize,

    /// Deadline for each agent or blobstore call
    pub call_timeout_secs: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            call_timeout_secs: 3600,
        }
    }
}

impl CompilerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}
