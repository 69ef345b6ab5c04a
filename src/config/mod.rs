//! Configuration for the mailbox server and the analysis client
//!
//! Loaded from a TOML file (default `<config dir>/opsis/config.toml`), every
//! field falling back to its default. Command-line overrides are applied on
//! top with [`ConfigMerger`].

mod merger;

pub use merger::{ConfigMerger, PartialConfig};

use crate::mailbox::{UnreadPolicy, DEFAULT_JOB_CAPACITY};
use crate::poll::{Backoff, PollConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub bind: String,
    /// Empty means any origin
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            bind: "0.0.0.0".to_string(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MailboxConfig {
    /// Maximum number of job-keyed results kept
    pub capacity: usize,
    pub unread_policy: UnreadPolicy,
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_JOB_CAPACITY,
            unread_policy: UnreadPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub interval_ms: u64,
    /// Interval growth factor; unset keeps a fixed interval
    pub backoff_multiplier: Option<f64>,
    pub max_interval_ms: Option<u64>,
    /// Give up after this long; unset polls forever
    pub max_wait_ms: Option<u64>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_ms: 3_000,
            backoff_multiplier: None,
            max_interval_ms: None,
            max_wait_ms: None,
        }
    }
}

impl PollSettings {
    pub fn to_poll_config(&self) -> PollConfig {
        let interval = Duration::from_millis(self.interval_ms);
        let backoff = self.backoff_multiplier.map(|multiplier| Backoff {
            multiplier,
            max_interval: self
                .max_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(interval * 10),
        });

        PollConfig {
            interval,
            backoff,
            max_wait: self.max_wait_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerSettings {
    pub base_url: String,
    /// Where the producer should deliver results
    pub callback_url: String,
    pub timeout_ms: u64,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            callback_url: "http://localhost:3000/callback".to_string(),
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub base_url: String,
    pub timeout_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsisConfig {
    pub server: ServerConfig,
    pub mailbox: MailboxConfig,
    pub poll: PollSettings,
    pub producer: ProducerSettings,
    pub search: SearchSettings,
    /// Mailbox service the client polls
    pub mailbox_url: Option<String>,
}

/// Largest accepted poll backoff multiplier
pub const MAX_BACKOFF_MULTIPLIER: f64 = 100.0;

impl OpsisConfig {
    /// Mailbox base URL, derived from the server port when unset
    pub fn mailbox_base_url(&self) -> String {
        self.mailbox_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.server.port))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mailbox.capacity == 0 {
            return Err(ConfigError::Invalid(
                "mailbox.capacity must be at least 1".to_string(),
            ));
        }
        if self.poll.interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll.interval_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(multiplier) = self.poll.backoff_multiplier {
            if !(1.0..=MAX_BACKOFF_MULTIPLIER).contains(&multiplier) {
                return Err(ConfigError::Invalid(format!(
                    "poll.backoff_multiplier must be between 1.0 and {}, got {}",
                    MAX_BACKOFF_MULTIPLIER, multiplier
                )));
            }
        }
        Ok(())
    }
}

/// Default config file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("opsis").join("config.toml"))
}

/// Load and validate a config file
pub fn load_config(path: &Path) -> Result<OpsisConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: OpsisConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    config.validate()?;
    log::debug!("Loaded config from {:?}", path);
    Ok(config)
}

/// Load an explicit config file, or the default one when it exists
pub fn resolve_config(explicit: Option<&Path>) -> Result<OpsisConfig, ConfigError> {
    if let Some(path) = explicit {
        return load_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => load_config(&path),
        _ => {
            log::debug!("No config file found, using defaults");
            Ok(OpsisConfig::default())
        }
    }
}
