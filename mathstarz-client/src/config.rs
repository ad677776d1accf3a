//! Client configuration.
//!
//! Settings come from an optional JSON file; every field has a default and
//! `MATHSTARZ_*` environment variables override the file.
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BACKEND_URL: &str = "https://mathstarz-server-1.onrender.com";
pub const ENV_BACKEND_URL: &str = "MATHSTARZ_BACKEND_URL";
pub const ENV_DATA_DIR: &str = "MATHSTARZ_DATA_DIR";
pub const ENV_LANGUAGE: &str = "MATHSTARZ_LANGUAGE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("backend URL must start with http:// or https://, got '{0}'")]
    InvalidBackendUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_backend_url() -> String {
    DEFAULT_BACKEND_URL.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    10
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".mathstarz")
}

fn default_language() -> String {
    "English".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            backend_url: default_backend_url(),
            request_timeout_secs: default_request_timeout_secs(),
            data_dir: default_data_dir(),
            language: default_language(),
        }
    }
}

impl ClientConfig {
    /// Parse a config document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid JSON or an unusable backend URL.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` (defaults when `None`) and apply environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_json(&json)?
            }
            None => Self::default(),
        };
        config.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup such as `std::env::var`.
    ///
    /// # Errors
    ///
    /// Returns an error if the overridden backend URL is unusable.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_BACKEND_URL).filter(|value| !value.trim().is_empty()) {
            log::debug!("Backend URL overridden by {ENV_BACKEND_URL}");
            self.backend_url = url.trim().to_string();
        }
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|value| !value.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(language) = lookup(ENV_LANGUAGE).filter(|value| !value.trim().is_empty()) {
            self.language = language;
        }
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend_url.starts_with("http://") || self.backend_url.starts_with("https://") {
            Ok(())
        } else {
            Err(ConfigError::InvalidBackendUrl(self.backend_url.clone()))
        }
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.backend_url.trim_end_matches('/')
    }
}
