use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable overriding `api.base_url`.
pub const API_URL_ENV: &str = "ROSTER_API_URL";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterConfig {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub reference: ReferenceConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,
    #[serde(default = "default_filter_debounce_ms")]
    pub filter_debounce_ms: u64,
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            search_debounce_ms: default_search_debounce_ms(),
            filter_debounce_ms: default_filter_debounce_ms(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
        }
    }
}

impl FetchConfig {
    #[must_use]
    pub const fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    #[must_use]
    pub const fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceConfig {
    /// Age after which a cached lookup list is refreshed in the background.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl ReferenceConfig {
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkConfig {
    /// Pause between the last tag removal and the tag add of a replace.
    /// Stands in for read-after-write consistency the backend does not
    /// promise; zero disables it.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl BulkConfig {
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RosterConfig {
    /// Resolve the effective configuration.
    ///
    /// Reads `roster.toml` from `project_dir` when present, otherwise the
    /// user file under the platform config dir, otherwise defaults. The
    /// `ROSTER_API_URL` environment variable then overrides `api.base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read or
    /// parsed, or if the resulting values are out of range.
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match config_path(project_dir) {
            Some(path) => Self::load_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a single config file without env overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] with the path.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str::<Self>(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(API_URL_ENV).filter(|url| !url.trim().is_empty()) {
            self.api.base_url = Some(url.trim().to_string());
        }
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fetch = &self.fetch;
        if fetch.max_page_size == 0 {
            return Err(ConfigError::Invalid(
                "fetch.max_page_size must be > 0".to_string(),
            ));
        }
        if fetch.default_page_size == 0 || fetch.default_page_size > fetch.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "fetch.default_page_size must be between 1 and {}, got {}",
                fetch.max_page_size, fetch.default_page_size
            )));
        }
        Ok(())
    }
}

fn config_path(project_dir: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = project_dir
        .map(|dir| dir.join("roster.toml"))
        .filter(|path| path.exists())
    {
        return Some(path);
    }
    dirs::config_dir()
        .map(|dir| dir.join("roster/config.toml"))
        .filter(|path| path.exists())
}

const fn default_search_debounce_ms() -> u64 {
    400
}

const fn default_filter_debounce_ms() -> u64 {
    300
}

const fn default_page_size() -> u32 {
    25
}

const fn default_max_page_size() -> u32 {
    100
}

const fn default_stale_after_secs() -> u64 {
    300
}

const fn default_settle_delay_ms() -> u64 {
    500
}

const fn default_timeout_secs() -> u64 {
    30
}
