mod openrouter;
mod pollinations;
mod wordpress;
mod wuzapi;

pub use openrouter::{
    ModelPrice, OpenRouterConfig, OpenRouterResolvedConfig, StepModels, TokenEstimate,
    TokenEstimates,
};
pub use pollinations::{PollinationsConfig, PollinationsResolvedConfig};
pub use wordpress::{WordPressConfig, WordPressResolvedConfig};
pub use wuzapi::{WuzapiConfig, WuzapiResolvedConfig};

use serde::{Deserialize, Serialize};
use url::Url;

/// Global provider defaults (used when provider-level config is unset).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderDefaults {
    /// Optional upstream HTTP proxy. If set, used for reqwest clients.
    /// TOML: `providers.defaults.proxy`. Example: `http://127.0.0.1:1080`.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Allow HTTP/2 multiplexing for reqwest clients; disabled forces HTTP/1.
    /// TOML: `providers.defaults.enable_multiplexing`. Default: `false`.
    #[serde(default = "default_enable_multiplexing")]
    pub enable_multiplexing: bool,

    /// Max inline retry attempts for transient upstream failures (transport errors, 5xx).
    /// TOML: `providers.defaults.retry_max_times`. Default: `3`.
    #[serde(default = "default_retry_max_times")]
    pub retry_max_times: usize,
}

impl Default for ProviderDefaults {
    fn default() -> Self {
        Self {
            proxy: None,
            enable_multiplexing: default_enable_multiplexing(),
            retry_max_times: default_retry_max_times(),
        }
    }
}

/// All provider configurations.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ProvidersConfig {
    /// Global defaults for providers (overridden per provider if set).
    #[serde(default)]
    pub defaults: ProviderDefaults,

    /// OpenRouter (language model) configuration.
    #[serde(default)]
    pub openrouter: OpenRouterConfig,

    /// Pollinations (image generation) configuration.
    #[serde(default)]
    pub pollinations: PollinationsConfig,

    /// WordPress REST client configuration. Site URLs and credentials live on each project.
    #[serde(default)]
    pub wordpress: WordPressConfig,

    /// Wuzapi (WhatsApp) notifications; disabled unless `api_url` and `token` are set.
    #[serde(default)]
    pub wuzapi: WuzapiConfig,
}

fn default_enable_multiplexing() -> bool {
    false
}

fn default_retry_max_times() -> usize {
    3
}
