// Configuration merging with priority

use super::OpsisConfig;
use crate::mailbox::UnreadPolicy;
use serde::{Deserialize, Serialize};

/// Overrides from the command line or environment.
/// Every field is optional; `None` keeps the underlying value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialConfig {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub cors_origins: Option<Vec<String>>,
    pub mailbox_capacity: Option<usize>,
    pub unread_policy: Option<UnreadPolicy>,
    pub poll_interval_ms: Option<u64>,
    pub max_wait_ms: Option<u64>,
    pub producer_url: Option<String>,
    pub callback_url: Option<String>,
    pub search_url: Option<String>,
    pub mailbox_url: Option<String>,
}

/// Configuration merger
/// Priority order: CLI -> File -> Defaults
pub struct ConfigMerger {
    defaults: OpsisConfig,
    file: Option<OpsisConfig>,
    cli: Option<PartialConfig>,
}

impl ConfigMerger {
    pub fn new() -> Self {
        Self {
            defaults: OpsisConfig::default(),
            file: None,
            cli: None,
        }
    }

    /// Set the config loaded from disk
    pub fn with_file(mut self, config: Option<OpsisConfig>) -> Self {
        self.file = config;
        self
    }

    /// Set CLI overrides
    pub fn with_cli(mut self, config: Option<PartialConfig>) -> Self {
        self.cli = config;
        self
    }

    /// Merge all layers with priority
    pub fn merge(&self) -> OpsisConfig {
        // A file config is already complete thanks to serde defaults
        let mut result = self.file.clone().unwrap_or_else(|| self.defaults.clone());

        if let Some(ref cli) = self.cli {
            Self::apply_partial(&mut result, cli);
        }

        result
    }

    fn apply_partial(config: &mut OpsisConfig, partial: &PartialConfig) {
        if let Some(port) = partial.port {
            config.server.port = port;
        }
        if let Some(ref bind) = partial.bind {
            config.server.bind = bind.clone();
        }
        if let Some(ref origins) = partial.cors_origins {
            config.server.cors_origins = origins.clone();
        }
        if let Some(capacity) = partial.mailbox_capacity {
            config.mailbox.capacity = capacity;
        }
        if let Some(policy) = partial.unread_policy {
            config.mailbox.unread_policy = policy;
        }
        if let Some(interval) = partial.poll_interval_ms {
            config.poll.interval_ms = interval;
        }
        if let Some(max_wait) = partial.max_wait_ms {
            config.poll.max_wait_ms = Some(max_wait);
        }
        if let Some(ref url) = partial.producer_url {
            config.producer.base_url = url.clone();
        }
        if let Some(ref url) = partial.callback_url {
            config.producer.callback_url = url.clone();
        }
        if let Some(ref url) = partial.search_url {
            config.search.base_url = url.clone();
        }
        if partial.mailbox_url.is_some() {
            config.mailbox_url = partial.mailbox_url.clone();
        }
    }
}

impl Default for ConfigMerger {
    fn default() -> Self {
        Self::new()
    }
}
