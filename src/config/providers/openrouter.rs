use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use super::ProviderDefaults;

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ModelPrice {
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

/// Model used by each language-model step.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StepModels {
    #[serde(default = "default_light_model")]
    pub research: String,
    #[serde(default = "default_light_model")]
    pub strategy: String,
    #[serde(default = "default_article_model")]
    pub article: String,
}

impl Default for StepModels {
    fn default() -> Self {
        Self {
            research: default_light_model(),
            strategy: default_light_model(),
            article: default_article_model(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenEstimate {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Token assumptions used by dry-run cost estimation.
///
/// Article output is `word_count * 1.4`; `article.output_tokens` only applies to a zero word count.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenEstimates {
    #[serde(default = "default_research_estimate")]
    pub research: TokenEstimate,
    #[serde(default = "default_strategy_estimate")]
    pub strategy: TokenEstimate,
    #[serde(default = "default_article_estimate")]
    pub article: TokenEstimate,
}

impl Default for TokenEstimates {
    fn default() -> Self {
        Self {
            research: default_research_estimate(),
            strategy: default_strategy_estimate(),
            article: default_article_estimate(),
        }
    }
}

/// OpenRouter provider configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OpenRouterConfig {
    /// Base API URL. TOML: `providers.openrouter.api_url`.
    /// Default: `https://openrouter.ai/api/v1/`.
    #[serde(default = "default_api_url")]
    pub api_url: Url,

    /// API key (required by `Config::from_toml()`).
    /// TOML: `providers.openrouter.api_key`.
    #[serde(default)]
    pub api_key: String,

    /// TOML: `providers.openrouter.models`.
    #[serde(default)]
    pub models: StepModels,

    /// Price table keyed by model id. TOML: `providers.openrouter.prices."<model>"`.
    #[serde(default = "default_prices")]
    pub prices: BTreeMap<String, ModelPrice>,

    /// TOML: `providers.openrouter.estimates`.
    #[serde(default)]
    pub estimates: TokenEstimates,

    /// Completion requests per second across all workers.
    /// TOML: `providers.openrouter.requests_per_second`. Default: `2`.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: u32,

    /// Sent as `HTTP-Referer` (OpenRouter app attribution).
    #[serde(default)]
    pub referer: Option<String>,

    /// Sent as `X-Title` (OpenRouter app attribution).
    #[serde(default)]
    pub app_title: Option<String>,

    /// Request timeout in seconds. Default: `180`.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Falls back to `providers.defaults.proxy` when unset.
    #[serde(default)]
    pub proxy: Option<Url>,

    /// Falls back to `providers.defaults.enable_multiplexing`.
    #[serde(default)]
    pub enable_multiplexing: Option<bool>,

    /// Falls back to `providers.defaults.retry_max_times`.
    #[serde(default)]
    pub retry_max_times: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct OpenRouterResolvedConfig {
    pub api_url: Url,
    pub api_key: String,
    pub models: StepModels,
    pub prices: BTreeMap<String, ModelPrice>,
    pub estimates: TokenEstimates,
    pub requests_per_second: u32,
    pub referer: Option<String>,
    pub app_title: Option<String>,
    pub timeout_secs: u64,
    pub proxy: Option<Url>,
    pub enable_multiplexing: bool,
    pub retry_max_times: usize,
}

impl OpenRouterConfig {
    pub fn resolve(&self, defaults: &ProviderDefaults) -> OpenRouterResolvedConfig {
        OpenRouterResolvedConfig {
            api_url: self.api_url.clone(),
            api_key: self.api_key.clone(),
            models: self.models.clone(),
            prices: self.prices.clone(),
            estimates: self.estimates.clone(),
            requests_per_second: self.requests_per_second.max(1),
            referer: self.referer.clone(),
            app_title: self.app_title.clone(),
            timeout_secs: self.timeout_secs,
            proxy: self.proxy.clone().or_else(|| defaults.proxy.clone()),
            enable_multiplexing: self
                .enable_multiplexing
                .unwrap_or(defaults.enable_multiplexing),
            retry_max_times: self.retry_max_times.unwrap_or(defaults.retry_max_times),
        }
    }
}

impl Default for OpenRouterConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            api_key: String::new(),
            models: StepModels::default(),
            prices: default_prices(),
            estimates: TokenEstimates::default(),
            requests_per_second: default_requests_per_second(),
            referer: None,
            app_title: None,
            timeout_secs: default_timeout_secs(),
            proxy: None,
            enable_multiplexing: None,
            retry_max_times: None,
        }
    }
}

fn default_api_url() -> Url {
    Url::parse("https://openrouter.ai/api/v1/").expect("valid fixed OpenRouter URL")
}

fn default_light_model() -> String {
    "openai/gpt-4o-mini".to_string()
}

fn default_article_model() -> String {
    "anthropic/claude-3.5-sonnet".to_string()
}

fn default_prices() -> BTreeMap<String, ModelPrice> {
    [
        ("openai/gpt-4o-mini", 0.15, 0.60),
        ("openai/gpt-4o", 2.50, 10.00),
        ("anthropic/claude-3.5-sonnet", 3.00, 15.00),
        ("google/gemini-2.0-flash-001", 0.10, 0.40),
    ]
    .into_iter()
    .map(|(model, input, output)| {
        (
            model.to_string(),
            ModelPrice {
                input_per_mtok: input,
                output_per_mtok: output,
            },
        )
    })
    .collect()
}

fn default_research_estimate() -> TokenEstimate {
    TokenEstimate {
        input_tokens: 600,
        output_tokens: 900,
    }
}

fn default_strategy_estimate() -> TokenEstimate {
    TokenEstimate {
        input_tokens: 1_200,
        output_tokens: 700,
    }
}

fn default_article_estimate() -> TokenEstimate {
    TokenEstimate {
        input_tokens: 1_500,
        output_tokens: 1_000,
    }
}

fn default_requests_per_second() -> u32 {
    2
}

fn default_timeout_secs() -> u64 {
    180
}
