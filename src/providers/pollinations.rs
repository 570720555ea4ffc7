use backon::ExponentialBuilder;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::config::PollinationsResolvedConfig;
use crate::error::ForgeError;
use crate::pipeline::Step;
use crate::providers::policy::ensure_success;
use crate::providers::upstream_retry::{network_retry_policy, send_with_retry};

const UPSTREAM: &str = "pollinations";

#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub source_url: Url,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct PollinationsClient {
    http: reqwest::Client,
    cfg: Arc<PollinationsResolvedConfig>,
    retry_policy: ExponentialBuilder,
}

impl PollinationsClient {
    pub fn new(http: reqwest::Client, cfg: Arc<PollinationsResolvedConfig>) -> Self {
        let retry_policy = network_retry_policy(cfg.retry_max_times);
        Self {
            http,
            cfg,
            retry_policy,
        }
    }

    /// `{image_url}/{prompt}?width=..&height=..&model=..&nologo=true&seed=..`.
    ///
    /// The seed pins the picture for a given prompt.
    pub fn image_url(&self, prompt: &str, seed: u32) -> Result<Url, ForgeError> {
        let mut url = self.cfg.image_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                ForgeError::UnexpectedError(format!(
                    "image url cannot be a base: {}",
                    self.cfg.image_url
                ))
            })?
            .pop_if_empty()
            .push(prompt.trim());
        url.query_pairs_mut()
            .append_pair("width", &self.cfg.width.to_string())
            .append_pair("height", &self.cfg.height.to_string())
            .append_pair("model", &self.cfg.model)
            .append_pair("nologo", "true")
            .append_pair("seed", &seed.to_string());
        Ok(url)
    }

    pub async fn generate(&self, prompt: &str) -> Result<GeneratedImage, ForgeError> {
        let url = self.image_url(prompt, rand::random::<u32>())?;
        self.download(&url).await
    }

    /// Downloads an image, rejecting responses that are not `image/*`.
    async fn download(&self, source_url: &Url) -> Result<GeneratedImage, ForgeError> {
        let resp = send_with_retry(UPSTREAM, self.retry_policy, || {
            self.http.get(source_url.clone())
        })
        .await?;
        let resp = ensure_success::<Value>(UPSTREAM, resp).await?;

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
            .unwrap_or_default();
        if !content_type.starts_with("image/") {
            return Err(ForgeError::MalformedOutput {
                step: Step::Image,
                reason: format!("expected an image, got content-type {content_type:?}"),
            });
        }

        let bytes = resp.bytes().await?.to_vec();
        if bytes.is_empty() {
            return Err(ForgeError::MalformedOutput {
                step: Step::Image,
                reason: "image body is empty".to_string(),
            });
        }

        info!(
            channel = UPSTREAM,
            content_type = %content_type,
            bytes = bytes.len(),
            "[Pollinations] image downloaded"
        );

        Ok(GeneratedImage {
            source_url: source_url.clone(),
            content_type,
            bytes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> PollinationsClient {
        let cfg = crate::config::PollinationsConfig::default()
            .resolve(&crate::config::ProviderDefaults::default());
        PollinationsClient::new(reqwest::Client::new(), Arc::new(cfg))
    }

    #[test]
    fn image_url_escapes_prompt_and_pins_seed() {
        let url = client().image_url("a red fox / at dawn", 42).unwrap();
        assert_eq!(url.host_str(), Some("image.pollinations.ai"));
        assert!(url.path().starts_with("/prompt/a%20red%20fox%20%2F%20at%20dawn"));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("seed".to_string(), "42".to_string())));
        assert!(pairs.contains(&("nologo".to_string(), "true".to_string())));
        assert!(pairs.contains(&("width".to_string(), "1280".to_string())));
    }
}
