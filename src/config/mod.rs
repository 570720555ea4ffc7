mod basic;
mod pipeline;
mod providers;

pub use basic::BasicConfig;
pub use pipeline::PipelineConfig;
pub use providers::{
    ModelPrice, OpenRouterConfig, OpenRouterResolvedConfig, PollinationsConfig,
    PollinationsResolvedConfig, ProviderDefaults, ProvidersConfig, StepModels, TokenEstimate,
    TokenEstimates, WordPressConfig, WordPressResolvedConfig, WuzapiConfig, WuzapiResolvedConfig,
};

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Job queue and idempotency settings (see `pipeline` table in config.toml).
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Upstream API settings (see `providers` table in config.toml).
    #[serde(default)]
    pub providers: ProvidersConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Builds a Figment that merges defaults and a config TOML file.
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        }
    }

    /// Loads configuration from the TOML file (with defaults) and validates required fields.
    pub fn from_toml() -> Self {
        if !PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            panic!("config file not found: {}", DEFAULT_CONFIG_FILE);
        }
        let cfg: Self = Self::figment().extract().unwrap_or_else(|err| {
            panic!(
                "failed to extract configuration from {}: {err}",
                DEFAULT_CONFIG_FILE
            )
        });
        if cfg.providers.openrouter.api_key.trim().is_empty() {
            panic!("providers.openrouter.api_key must be set and non-empty");
        }
        if cfg.basic.admin_key.trim().is_empty() {
            panic!("basic.admin_key must be set and non-empty");
        }
        cfg
    }

    pub fn openrouter(&self) -> OpenRouterResolvedConfig {
        self.providers.openrouter.resolve(&self.providers.defaults)
    }

    pub fn pollinations(&self) -> PollinationsResolvedConfig {
        self.providers.pollinations.resolve(&self.providers.defaults)
    }

    pub fn wordpress(&self) -> WordPressResolvedConfig {
        self.providers.wordpress.resolve(&self.providers.defaults)
    }

    /// `None` when Wuzapi is not configured (notifications disabled).
    pub fn wuzapi(&self) -> Option<WuzapiResolvedConfig> {
        self.providers.wuzapi.resolve(&self.providers.defaults)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::providers::Toml;

    #[test]
    fn provider_values_fall_back_to_defaults() {
        let cfg: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [providers.defaults]
                retry_max_times = 7

                [providers.wordpress]
                retry_max_times = 1
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(cfg.openrouter().retry_max_times, 7);
        assert_eq!(cfg.pollinations().retry_max_times, 7);
        assert_eq!(cfg.wordpress().retry_max_times, 1);
    }

    #[test]
    fn wuzapi_is_disabled_without_url_and_token() {
        let cfg = Config::default();
        assert!(cfg.wuzapi().is_none());

        let cfg: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(
                r#"
                [providers.wuzapi]
                api_url = "http://127.0.0.1:8080"
                token = "t0k"
                "#,
            ))
            .extract()
            .unwrap();
        let wz = cfg.wuzapi().expect("wuzapi configured");
        assert_eq!(wz.token, "t0k");
    }
}
