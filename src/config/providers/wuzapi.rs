use serde::{Deserialize, Serialize};
use url::Url;

use super::ProviderDefaults;

/// Wuzapi (WhatsApp gateway) configuration managed by Figment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WuzapiConfig {
    /// TOML: `providers.wuzapi.api_url`. Example: `http://127.0.0.1:8080`.
    #[serde(default)]
    pub api_url: Option<Url>,

    /// User token sent in the `Token` header.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub proxy: Option<Url>,

    #[serde(default)]
    pub retry_max_times: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct WuzapiResolvedConfig {
    pub api_url: Url,
    pub token: String,
    pub proxy: Option<Url>,
    pub retry_max_times: usize,
}

impl WuzapiConfig {
    pub fn resolve(&self, defaults: &ProviderDefaults) -> Option<WuzapiResolvedConfig> {
        let api_url = self.api_url.clone()?;
        let token = self.token.clone().filter(|t| !t.trim().is_empty())?;
        Some(WuzapiResolvedConfig {
            api_url,
            token,
            proxy: self.proxy.clone().or_else(|| defaults.proxy.clone()),
            retry_max_times: self.retry_max_times.unwrap_or(defaults.retry_max_times),
        })
    }
}
