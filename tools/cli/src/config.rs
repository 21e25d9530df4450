//! CLI configuration file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use tasksync_sync::SyncConfig;

/// Default task server address.
pub const DEFAULT_SERVER_URL: &str = "http://0.0.0.0:8080";

/// Configuration file name inside the config directory.
pub const CONFIG_FILENAME: &str = "config.json";

/// Effective CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Base URL of the task server.
    pub server_url: String,
    /// Directory holding the local store.
    pub data_dir: PathBuf,
    /// Store backend: "file", "sqlite" or "memory".
    pub store: String,
    /// Connect timeout of the connectivity probe.
    pub probe_timeout_ms: u64,
    /// How often `watch` probes the server.
    pub probe_interval_secs: u64,
    /// Engine settings.
    pub sync: SyncConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            data_dir: default_data_dir(),
            store: "file".to_string(),
            probe_timeout_ms: 1500,
            probe_interval_secs: 5,
            sync: SyncConfig::default(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tasksync")
}

/// Default location of the configuration file, if the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tasksync").join(CONFIG_FILENAME))
}

impl AppConfig {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// read when present and built-in defaults are used otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::read(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Parse from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Apply command-line overrides.
    pub fn apply_overrides(
        &mut self,
        server_url: Option<String>,
        data_dir: Option<PathBuf>,
        store: Option<String>,
    ) {
        if let Some(server_url) = server_url {
            self.server_url = server_url;
        }
        if let Some(data_dir) = data_dir {
            self.data_dir = data_dir;
        }
        if let Some(store) = store {
            self.store = store;
        }
    }

    /// Options passed to the store registry for `self.store`.
    pub fn store_options(&self) -> Value {
        match self.store.as_str() {
            "file" => serde_json::json!({ "root": self.data_dir.to_string_lossy() }),
            "sqlite" => serde_json::json!({
                "path": self.data_dir.join("tasks.db").to_string_lossy()
            }),
            _ => Value::Null,
        }
    }

    /// `host:port` of the server, for the connectivity probe.
    pub fn probe_addr(&self) -> Result<String> {
        let url = Url::parse(&self.server_url)
            .with_context(|| format!("Invalid server URL {}", self.server_url))?;
        let host = url
            .host_str()
            .with_context(|| format!("Server URL {} has no host", self.server_url))?;
        let port = url
            .port_or_known_default()
            .with_context(|| format!("Server URL {} has no port", self.server_url))?;
        Ok(format!("{}:{}", host, port))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}
