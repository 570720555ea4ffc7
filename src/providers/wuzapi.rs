use backon::ExponentialBuilder;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use wpforge_schema::{WuzapiResponse, WuzapiSendText};

use crate::config::WuzapiResolvedConfig;
use crate::error::ForgeError;
use crate::providers::policy::ensure_success;
use crate::providers::upstream_retry::{network_retry_policy, send_with_retry};

const UPSTREAM: &str = "wuzapi";

/// WhatsApp text notifications through a Wuzapi gateway.
#[derive(Clone)]
pub struct WuzapiClient {
    http: reqwest::Client,
    cfg: Arc<WuzapiResolvedConfig>,
    retry_policy: ExponentialBuilder,
}

impl WuzapiClient {
    pub fn new(http: reqwest::Client, cfg: Arc<WuzapiResolvedConfig>) -> Self {
        let retry_policy = network_retry_policy(cfg.retry_max_times);
        Self {
            http,
            cfg,
            retry_policy,
        }
    }

    pub async fn send_text(&self, phone: &str, body: String) -> Result<WuzapiResponse, ForgeError> {
        let url = self.cfg.api_url.join("chat/send/text")?;
        let payload = WuzapiSendText {
            phone: phone.chars().filter(|c| c.is_ascii_digit()).collect(),
            body,
        };

        let resp = send_with_retry(UPSTREAM, self.retry_policy, || {
            self.http
                .post(url.clone())
                .header("Token", &self.cfg.token)
                .json(&payload)
        })
        .await?;
        let resp = ensure_success::<Value>(UPSTREAM, resp).await?;
        let parsed: WuzapiResponse = serde_json::from_slice(&resp.bytes().await?)?;

        info!(channel = UPSTREAM, success = parsed.success, "[Wuzapi] text sent");
        Ok(parsed)
    }
}
