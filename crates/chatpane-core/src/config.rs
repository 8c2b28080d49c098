use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

pub const APP_DIR_NAME: &str = "chatpane";
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const ENV_COMPLETION_URL: &str = "CHATPANE_COMPLETION_URL";
pub const ENV_DATABASE: &str = "CHATPANE_DATABASE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot determine config directory")]
    NoConfigDir,

    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Tuning of the streaming reply engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum spacing of mid-stream upserts; 0 persists after every chunk.
    pub persist_interval_ms: u64,
    /// Whether pausing also aborts the in-flight request.
    pub pause_cancels_stream: bool,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_interval_ms: 250,
            pause_cancels_stream: true,
            request_timeout_secs: 120,
        }
    }
}

impl EngineConfig {
    pub fn persist_interval(&self) -> Duration {
        Duration::from_millis(self.persist_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub completion_url: String,
    pub database_path: PathBuf,
    pub preferences_path: PathBuf,
    pub engine: EngineConfig,
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        let app_dir = app_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            completion_url: "http://localhost:3000/api/chat".to_string(),
            database_path: app_dir.join("chat.db"),
            preferences_path: app_dir.join("preferences.json"),
            engine: EngineConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

/// `<config dir>/chatpane`, if the platform has a config directory.
pub fn app_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME))
}

impl AppConfig {
    /// Load `config.json` from the app config directory and apply
    /// environment overrides. A missing file yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = app_dir()
            .ok_or(ConfigError::NoConfigDir)?
            .join(CONFIG_FILE_NAME);
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let config = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process env).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_COMPLETION_URL).filter(|v| !v.is_empty()) {
            self.completion_url = url;
        }
        if let Some(path) = lookup(ENV_DATABASE).filter(|v| !v.is_empty()) {
            self.database_path = PathBuf::from(path);
        }
    }
}
