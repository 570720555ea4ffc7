use serde::{Deserialize, Serialize};
use url::Url;

use super::ProviderDefaults;

/// WordPress REST client configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WordPressConfig {
    /// Request timeout in seconds (media uploads included).
    /// TOML: `providers.wordpress.timeout_secs`. Default: `60`.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub proxy: Option<Url>,

    #[serde(default)]
    pub enable_multiplexing: Option<bool>,

    #[serde(default)]
    pub retry_max_times: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct WordPressResolvedConfig {
    pub timeout_secs: u64,
    pub proxy: Option<Url>,
    pub enable_multiplexing: bool,
    pub retry_max_times: usize,
}

impl WordPressConfig {
    pub fn resolve(&self, defaults: &ProviderDefaults) -> WordPressResolvedConfig {
        WordPressResolvedConfig {
            timeout_secs: self.timeout_secs,
            proxy: self.proxy.clone().or_else(|| defaults.proxy.clone()),
            enable_multiplexing: self
                .enable_multiplexing
                .unwrap_or(defaults.enable_multiplexing),
            retry_max_times: self.retry_max_times.unwrap_or(defaults.retry_max_times),
        }
    }
}

impl Default for WordPressConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            proxy: None,
            enable_multiplexing: None,
            retry_max_times: None,
        }
    }
}

fn default_timeout_secs() -> u64 {
    60
}
