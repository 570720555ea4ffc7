use reqwest::header::{CONNECTION, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use url::Url;

use crate::config::Config;
use crate::error::ForgeError;
use crate::providers::{OpenRouterClient, PollinationsClient, WordPressClient, WuzapiClient};

const USER_AGENT: &str = concat!("wpforge/", env!("CARGO_PKG_VERSION"));

/// Clients for every upstream the pipeline calls.
#[derive(Clone)]
pub struct Upstreams {
    pub openrouter: OpenRouterClient,
    pub pollinations: PollinationsClient,
    pub wordpress: WordPressClient,
    /// `None` when WhatsApp notifications are not configured.
    pub wuzapi: Option<WuzapiClient>,
}

impl Upstreams {
    pub fn from_config(cfg: &Config) -> Result<Self, ForgeError> {
        let defaults = &cfg.providers.defaults;
        let openrouter_cfg = Arc::new(cfg.openrouter());
        let pollinations_cfg = Arc::new(cfg.pollinations());
        let wordpress_cfg = Arc::new(cfg.wordpress());
        let wuzapi_cfg = cfg.wuzapi().map(Arc::new);

        info!(
            providers_defaults_proxy = %defaults.proxy.as_ref().map(|u| u.as_str()).unwrap_or("<none>"),
            providers_defaults_enable_multiplexing = defaults.enable_multiplexing,
            providers_defaults_retry_max_times = defaults.retry_max_times,
            "Provider defaults loaded"
        );
        info!(
            openrouter_api_url = %openrouter_cfg.api_url,
            openrouter_requests_per_second = openrouter_cfg.requests_per_second,
            openrouter_models = ?openrouter_cfg.models,
            openrouter_priced_models = openrouter_cfg.prices.len(),
            openrouter_retry_max_times = openrouter_cfg.retry_max_times,
            "OpenRouter config (effective)"
        );
        info!(
            pollinations_image_url = %pollinations_cfg.image_url,
            pollinations_model = %pollinations_cfg.model,
            pollinations_size = %format!("{}x{}", pollinations_cfg.width, pollinations_cfg.height),
            "Pollinations config (effective)"
        );
        info!(
            wordpress_timeout_secs = wordpress_cfg.timeout_secs,
            wordpress_retry_max_times = wordpress_cfg.retry_max_times,
            wuzapi_enabled = wuzapi_cfg.is_some(),
            "WordPress/Wuzapi config (effective)"
        );

        let openrouter = OpenRouterClient::new(
            build_client(
                openrouter_cfg.proxy.clone(),
                openrouter_cfg.enable_multiplexing,
                Duration::from_secs(openrouter_cfg.timeout_secs),
            )?,
            openrouter_cfg,
        );
        let pollinations = PollinationsClient::new(
            build_client(
                pollinations_cfg.proxy.clone(),
                pollinations_cfg.enable_multiplexing,
                Duration::from_secs(120),
            )?,
            pollinations_cfg,
        );
        let wordpress = WordPressClient::new(
            build_client(
                wordpress_cfg.proxy.clone(),
                wordpress_cfg.enable_multiplexing,
                Duration::from_secs(wordpress_cfg.timeout_secs),
            )?,
            wordpress_cfg,
        );
        let wuzapi = match wuzapi_cfg {
            Some(wuzapi_cfg) => Some(WuzapiClient::new(
                build_client(wuzapi_cfg.proxy.clone(), true, Duration::from_secs(30))?,
                wuzapi_cfg,
            )),
            None => None,
        };

        Ok(Self {
            openrouter,
            pollinations,
            wordpress,
            wuzapi,
        })
    }
}

pub fn build_client(
    proxy: Option<Url>,
    enable_multiplexing: bool,
    timeout: Duration,
) -> Result<reqwest::Client, ForgeError> {
    let mut headers = HeaderMap::new();

    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(reqwest::redirect::Policy::limited(5))
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout);

    if let Some(proxy_url) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }

    if !enable_multiplexing {
        headers.insert(CONNECTION, HeaderValue::from_static("close"));

        builder = builder
            .http1_only()
            .pool_max_idle_per_host(0)
            .pool_idle_timeout(Duration::from_secs(0));
    } else {
        builder = builder.http2_adaptive_window(true);
    }

    Ok(builder.default_headers(headers).build()?)
}
