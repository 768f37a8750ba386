use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

const DEFAULT_BASE_URL: &str = "http://localhost:4000";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const CONFIG_FILE_ENV: &str = "POST_DOWNLOADER_CONFIG";
const API_URL_ENV: &str = "POST_DOWNLOADER_API_URL";
const TIMEOUT_ENV: &str = "POST_DOWNLOADER_TIMEOUT_SECS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Configuration for the API client
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: Url,
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl ApiConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Override fields from environment-style lookups. Invalid values are
    /// logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(API_URL_ENV) {
            match Url::parse(&value) {
                Ok(url) => self.base_url = url,
                Err(e) => warn!(value = %value, error = %e, "ignoring invalid {}", API_URL_ENV),
            }
        }

        if let Some(value) = lookup(TIMEOUT_ENV) {
            match value.parse::<u64>() {
                Ok(secs) if secs > 0 => self.timeout_secs = secs,
                _ => warn!(value = %value, "ignoring invalid {}", TIMEOUT_ENV),
            }
        }
    }
}

fn config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir().map(|dir| dir.join("post-downloader").join("config.toml"))
}

/// Defaults, then the config file if present, then environment overrides.
pub fn load() -> ApiConfig {
    let mut config = match config_path() {
        Some(path) if path.exists() => match ApiConfig::from_file(&path) {
            Ok(config) => {
                info!(path = %path.display(), "loaded configuration");
                config
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default configuration");
                ApiConfig::default()
            }
        },
        _ => ApiConfig::default(),
    };

    config.apply_overrides(|key| std::env::var(key).ok());
    config
}
