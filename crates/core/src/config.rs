//! TOML configuration for the syncer binary.
//!
//! Every section has defaults, so an empty file is a valid configuration
//! apart from the API base URL, which must parse as an absolute URL.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use url::Url;

use crate::error::Error;
use crate::result::Result;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Path to the YAML manifest of declared resources.
    pub manifest: PathBuf,
    /// JSON file holding persisted statuses between runs. Statuses live only
    /// in memory when unset.
    pub state_file: Option<PathBuf>,
    /// Default log filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Reconciliation cadence and limits.
    pub reconcile: ReconcileSettings,
    /// Remote API endpoint.
    pub api: ApiSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            manifest: PathBuf::from("resources.yaml"),
            state_file: None,
            log_level: "info".to_string(),
            reconcile: ReconcileSettings::default(),
            api: ApiSettings::default(),
        }
    }
}

/// Reconciliation loop settings. Durations are whole seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReconcileSettings {
    pub interval_secs: u64,
    pub force_sync_period_secs: u64,
    pub operation_timeout_secs: u64,
    pub max_concurrent: usize,
    pub max_errors: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            force_sync_period_secs: 3600,
            operation_timeout_secs: 30,
            max_concurrent: 10,
            max_errors: 10,
        }
    }
}

impl ReconcileSettings {
    /// Interval between reconciliation ticks.
    #[inline]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Age after which a resource is force-resynced.
    #[inline]
    pub const fn force_sync_period(&self) -> Duration {
        Duration::from_secs(self.force_sync_period_secs)
    }

    /// Timeout applied to each remote call.
    #[inline]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

/// Remote API settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiSettings {
    pub base_url: String,
    /// Static headers sent with every request.
    pub headers: BTreeMap<String, String>,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            headers: BTreeMap::new(),
        }
    }
}

impl ApiSettings {
    /// Parse the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the URL does not parse.
    pub fn url(&self) -> Result<Url> {
        Url::parse(&self.base_url).map_err(|e| {
            Error::invalid_config(format!("api.base_url '{}': {e}", self.base_url))
        })
    }
}

impl Config {
    /// Parse and validate configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed TOML or unknown keys, and
    /// `InvalidConfig` when a value is out of range.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::toml_parse_failed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file.
    ///
    /// Relative manifest and state file paths are resolved against the
    /// config file's directory.
    ///
    /// # Errors
    ///
    /// Returns `FileReadFailed` if the file cannot be read, otherwise the
    /// errors of [`Config::from_toml_str`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(dir) = path.parent() {
            config.manifest = resolve(dir, config.manifest);
            config.state_file = config.state_file.map(|file| resolve(dir, file));
        }
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first offending value.
    pub fn validate(&self) -> Result<()> {
        let r = &self.reconcile;
        if r.interval_secs == 0 {
            return Err(Error::invalid_config("reconcile.interval_secs must be positive"));
        }
        if r.operation_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "reconcile.operation_timeout_secs must be positive",
            ));
        }
        if r.max_concurrent == 0 {
            return Err(Error::invalid_config(
                "reconcile.max_concurrent must be at least 1",
            ));
        }
        self.api.url().map(|_| ())
    }
}

fn resolve(dir: &Path, path: PathBuf) -> PathBuf {
    if path.is_relative() { dir.join(path) } else { path }
}
