//! On-disk configuration for the offline cache.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::{LogFormat, MultiAppError, Result};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Cache worker settings
    pub worker: WorkerSection,

    /// Network settings
    pub network: NetworkSection,

    /// Cache store persistence
    pub storage: StorageSection,

    /// Log output
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    /// Scope URL the worker controls
    pub scope: String,

    /// Cache generation name; bump on every deploy that changes precached content
    pub cache_name: String,

    /// URLs stored at install time, relative to the scope
    pub precache: Vec<String>,

    /// Path prefix of the installable sub-applications
    pub app_prefix: String,

    /// Document served for failed navigations
    pub offline_fallback: String,

    /// Skip the waiting state right after install
    pub eager_activation: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSection {
    /// User agent string
    pub user_agent: String,

    /// Request timeout in seconds (0 disables it)
    pub timeout_secs: u64,

    /// Maximum redirects
    pub max_redirects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// Directory holding the cache snapshot
    pub cache_dir: PathBuf,

    /// Persist the cache store between runs
    pub persist: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Level name (error, warn, info, debug, trace)
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            scope: "http://localhost:8080/".to_string(),
            cache_name: "multiapp-cache-v1".to_string(),
            precache: [
                "./",
                "./index.html",
                "./index.js",
                "./about.html",
                "./manifest.json",
                "./icon-192.svg",
                "./icon-512.svg",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            app_prefix: "/Apps/".to_string(),
            offline_fallback: "./index.html".to_string(),
            eager_activation: false,
        }
    }
}

impl Default for NetworkSection {
    fn default() -> Self {
        Self {
            user_agent: format!("multiapp/{}", env!("CARGO_PKG_VERSION")),
            timeout_secs: 30,
            max_redirects: 10,
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            cache_dir: dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("multiapp"),
            persist: true,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Read a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            MultiAppError::config_with_source(format!("cannot read {}", path.display()), e)
        })?;
        let config: AppConfig = serde_json::from_str(&contents).map_err(|e| {
            MultiAppError::config_with_source(format!("cannot parse {}", path.display()), e)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read a configuration file, using defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Check the fields the worker cannot run without.
    pub fn validate(&self) -> Result<()> {
        if self.worker.cache_name.trim().is_empty() {
            return Err(MultiAppError::config("worker.cache_name must not be empty"));
        }
        let scope = Url::parse(&self.worker.scope).map_err(|e| {
            MultiAppError::config_with_source(format!("invalid scope '{}'", self.worker.scope), e)
        })?;
        if scope.cannot_be_a_base() {
            return Err(MultiAppError::config(format!(
                "scope '{}' cannot resolve relative URLs",
                self.worker.scope
            )));
        }
        if !self.worker.app_prefix.starts_with('/') {
            return Err(MultiAppError::config("worker.app_prefix must start with '/'"));
        }
        Ok(())
    }

    /// Path of the cache snapshot file.
    pub fn snapshot_path(&self) -> PathBuf {
        self.storage.cache_dir.join("cache-storage.json")
    }
}
