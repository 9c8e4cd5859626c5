//! krane.toml configuration parser.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default metrics backend handed to judge tasks.
pub const DEFAULT_PROMETHEUS: &str = "http://prometheus.istio-system.svc.cluster.local:9090";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KraneConfig {
    pub controller: ControllerConfig,
    pub judge: JudgeConfig,
    pub store: StoreConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Seconds before a pending or failed release is reconciled again.
    pub requeue_secs: u64,
    /// Seconds between full relists of releases.
    pub resync_secs: u64,
    /// Distinct releases reconciled in parallel.
    pub max_concurrent: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            requeue_secs: 5,
            resync_secs: 5,
            max_concurrent: 8,
        }
    }
}

impl ControllerConfig {
    pub fn requeue_after(&self) -> Duration {
        Duration::from_secs(self.requeue_secs)
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Metrics backend address written into judge task environments.
    pub prometheus: String,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            prometheus: DEFAULT_PROMETHEUS.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/krane"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { port: 8480 }
    }
}

impl KraneConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
