use backon::ExponentialBuilder;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use wpforge_schema::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, OpenRouterErrorBody,
    ResponseFormat,
};

use crate::config::OpenRouterResolvedConfig;
use crate::error::ForgeError;
use crate::pipeline::Step;
use crate::providers::policy::ensure_success;
use crate::providers::upstream_retry::{network_retry_policy, send_with_retry};
use crate::utils::logging::with_pretty_json_debug;

const UPSTREAM: &str = "openrouter";

/// A finished chat completion with the usage OpenRouter billed for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    /// Model that served the request, falling back to the requested id.
    pub model: String,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

#[derive(Clone)]
pub struct OpenRouterClient {
    http: reqwest::Client,
    cfg: Arc<OpenRouterResolvedConfig>,
    limiter: Arc<DefaultDirectRateLimiter>,
    retry_policy: ExponentialBuilder,
}

impl OpenRouterClient {
    pub fn new(http: reqwest::Client, cfg: Arc<OpenRouterResolvedConfig>) -> Self {
        let rps = NonZeroU32::new(cfg.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(cfg.requests_per_second.saturating_mul(2)).unwrap_or(rps);
        let limiter = Arc::new(RateLimiter::direct(
            Quota::per_second(rps).allow_burst(burst),
        ));
        let retry_policy = network_retry_policy(cfg.retry_max_times);

        Self {
            http,
            cfg,
            limiter,
            retry_policy,
        }
    }

    pub fn config(&self) -> &OpenRouterResolvedConfig {
        &self.cfg
    }

    /// One JSON-mode chat completion for `step`. Blank or missing content is a
    /// `MalformedOutput` error.
    pub async fn chat(
        &self,
        step: Step,
        model: &str,
        messages: Vec<ChatMessage>,
        max_tokens: Option<u32>,
    ) -> Result<Completion, ForgeError> {
        let url = self.cfg.api_url.join("chat/completions")?;
        let body = ChatCompletionRequest {
            model: model.to_string(),
            messages,
            temperature: Some(0.7),
            max_tokens,
            response_format: Some(ResponseFormat::json_object()),
        };
        with_pretty_json_debug(&body, |pretty_body| {
            debug!(channel = UPSTREAM, step = %step, "[OpenRouter] request body:\n{}", pretty_body);
        });

        self.limiter.until_ready().await;
        let start = Instant::now();

        let resp = send_with_retry(UPSTREAM, self.retry_policy, || {
            let mut req = self
                .http
                .post(url.clone())
                .bearer_auth(&self.cfg.api_key)
                .json(&body);
            if let Some(referer) = &self.cfg.referer {
                req = req.header("HTTP-Referer", referer);
            }
            if let Some(title) = &self.cfg.app_title {
                req = req.header("X-Title", title);
            }
            req
        })
        .await?;
        let resp = ensure_success::<OpenRouterErrorBody>(UPSTREAM, resp).await?;

        let bytes = resp.bytes().await?;
        let parsed: ChatCompletionResponse = serde_json::from_slice(&bytes)?;

        let content = parsed
            .first_content()
            .ok_or_else(|| ForgeError::MalformedOutput {
                step,
                reason: "completion returned no content".to_string(),
            })?
            .to_string();
        let usage = parsed.usage.unwrap_or_default();
        let served_by = parsed.model.unwrap_or_else(|| model.to_string());

        info!(
            channel = UPSTREAM,
            step = %step,
            req.model = %model,
            resp.model = %served_by,
            tokens_in = usage.prompt_tokens,
            tokens_out = usage.completion_tokens,
            took_ms = start.elapsed().as_millis() as u64,
            "[OpenRouter] completion finished"
        );

        Ok(Completion {
            content,
            model: served_by,
            tokens_in: usage.prompt_tokens,
            tokens_out: usage.completion_tokens,
        })
    }
}
