use serde::{Deserialize, Serialize};
use url::Url;

use super::ProviderDefaults;

/// Pollinations image provider configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PollinationsConfig {
    /// Prompt endpoint; the URL-encoded prompt is appended as the last path segment.
    /// TOML: `providers.pollinations.image_url`. Default: `https://image.pollinations.ai/prompt`.
    #[serde(default = "default_image_url")]
    pub image_url: Url,

    /// TOML: `providers.pollinations.model`. Default: `flux`.
    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Flat USD price per generated image used by cost estimation. Default: `0`.
    #[serde(default)]
    pub price_per_image: f64,

    /// Falls back to `providers.defaults.proxy` when unset.
    #[serde(default)]
    pub proxy: Option<Url>,

    #[serde(default)]
    pub enable_multiplexing: Option<bool>,

    #[serde(default)]
    pub retry_max_times: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct PollinationsResolvedConfig {
    pub image_url: Url,
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub proxy: Option<Url>,
    pub enable_multiplexing: bool,
    pub retry_max_times: usize,
}

impl PollinationsConfig {
    pub fn resolve(&self, defaults: &ProviderDefaults) -> PollinationsResolvedConfig {
        PollinationsResolvedConfig {
            image_url: self.image_url.clone(),
            model: self.model.clone(),
            width: self.width,
            height: self.height,
            proxy: self.proxy.clone().or_else(|| defaults.proxy.clone()),
            enable_multiplexing: self
                .enable_multiplexing
                .unwrap_or(defaults.enable_multiplexing),
            retry_max_times: self.retry_max_times.unwrap_or(defaults.retry_max_times),
        }
    }
}

impl Default for PollinationsConfig {
    fn default() -> Self {
        Self {
            image_url: default_image_url(),
            model: default_model(),
            width: default_width(),
            height: default_height(),
            price_per_image: 0.0,
            proxy: None,
            enable_multiplexing: None,
            retry_max_times: None,
        }
    }
}

fn default_image_url() -> Url {
    Url::parse("https://image.pollinations.ai/prompt").expect("valid fixed Pollinations URL")
}

fn default_model() -> String {
    "flux".to_string()
}

fn default_width() -> u32 {
    1280
}

fn default_height() -> u32 {
    720
}
