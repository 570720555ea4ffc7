use backon::ExponentialBuilder;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_TYPE};
use std::sync::Arc;
use tracing::info;
use url::Url;
use wpforge_schema::{WpErrorBody, WpMedia, WpPost, WpPostRequest};

use crate::config::WordPressResolvedConfig;
use crate::db::DbProject;
use crate::error::ForgeError;
use crate::providers::policy::{ensure_success, upstream_error};
use crate::providers::upstream_retry::{
    RetryOn, network_retry_policy, send_with_retry, send_with_retry_on,
};

const UPSTREAM: &str = "wordpress";

/// Credentials and REST root of one project's WordPress site.
#[derive(Debug, Clone)]
pub struct WpSite {
    api_root: Url,
    authorization: String,
}

impl WpSite {
    pub fn new(wp_url: &str, username: &str, app_password: &str) -> Result<Self, ForgeError> {
        let mut base = Url::parse(wp_url.trim())?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let api_root = base.join("wp-json/wp/v2/")?;
        // Application passwords are shown with spaces; WordPress accepts them either way.
        let credentials = format!("{}:{}", username, app_password);
        Ok(Self {
            api_root,
            authorization: format!("Basic {}", STANDARD.encode(credentials)),
        })
    }

    pub fn from_project(project: &DbProject) -> Result<Self, ForgeError> {
        Self::new(
            &project.wp_url,
            &project.wp_username,
            &project.wp_app_password,
        )
    }

    fn endpoint(&self, path: &str) -> Result<Url, ForgeError> {
        Ok(self.api_root.join(path)?)
    }
}

#[derive(Clone)]
pub struct WordPressClient {
    http: reqwest::Client,
    retry_policy: ExponentialBuilder,
}

impl WordPressClient {
    pub fn new(http: reqwest::Client, cfg: Arc<WordPressResolvedConfig>) -> Self {
        Self {
            http,
            retry_policy: network_retry_policy(cfg.retry_max_times),
        }
    }

    /// `POST /wp-json/wp/v2/media` with the raw file as body. Not resent after the server
    /// may have seen it.
    pub async fn upload_media(
        &self,
        site: &WpSite,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<WpMedia, ForgeError> {
        let url = site.endpoint("media")?;
        let disposition = format!("attachment; filename=\"{}\"", filename.replace('"', ""));

        let resp = send_with_retry_on(UPSTREAM, self.retry_policy, RetryOn::Unsent, || {
            self.http
                .post(url.clone())
                .header(AUTHORIZATION, &site.authorization)
                .header(CONTENT_TYPE, content_type)
                .header(CONTENT_DISPOSITION, &disposition)
                .body(bytes.clone())
        })
        .await?;
        let resp = ensure_success::<WpErrorBody>(UPSTREAM, resp).await?;
        let media: WpMedia = serde_json::from_slice(&resp.bytes().await?)?;

        info!(channel = UPSTREAM, media_id = media.id, "[WordPress] media uploaded");
        Ok(media)
    }

    /// `POST /wp-json/wp/v2/posts`. Like media uploads, only resent when it never left.
    pub async fn create_post(
        &self,
        site: &WpSite,
        post: &WpPostRequest,
    ) -> Result<WpPost, ForgeError> {
        self.write_post(site, site.endpoint("posts")?, RetryOn::Unsent, post)
            .await
    }

    /// `POST /wp-json/wp/v2/posts/{id}`.
    pub async fn update_post(
        &self,
        site: &WpSite,
        wp_post_id: u64,
        post: &WpPostRequest,
    ) -> Result<WpPost, ForgeError> {
        let url = site.endpoint(&format!("posts/{wp_post_id}"))?;
        self.write_post(site, url, RetryOn::Transient, post).await
    }

    async fn write_post(
        &self,
        site: &WpSite,
        url: Url,
        retry_on: RetryOn,
        post: &WpPostRequest,
    ) -> Result<WpPost, ForgeError> {
        let resp = send_with_retry_on(UPSTREAM, self.retry_policy, retry_on, || {
            self.http
                .post(url.clone())
                .header(AUTHORIZATION, &site.authorization)
                .json(post)
        })
        .await?;
        let resp = ensure_success::<WpErrorBody>(UPSTREAM, resp).await?;
        let created: WpPost = serde_json::from_slice(&resp.bytes().await?)?;

        info!(
            channel = UPSTREAM,
            wp_post_id = created.id,
            status = created.status.as_deref().unwrap_or("<unknown>"),
            "[WordPress] post written"
        );
        Ok(created)
    }

    /// `DELETE /wp-json/wp/v2/posts/{id}?force=true`, bypassing the trash.
    ///
    /// Returns `false` when WordPress no longer has the post.
    pub async fn delete_post(&self, site: &WpSite, wp_post_id: u64) -> Result<bool, ForgeError> {
        let mut url = site.endpoint(&format!("posts/{wp_post_id}"))?;
        url.query_pairs_mut().append_pair("force", "true");

        let resp = send_with_retry(UPSTREAM, self.retry_policy, || {
            self.http
                .delete(url.clone())
                .header(AUTHORIZATION, &site.authorization)
        })
        .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
            info!(channel = UPSTREAM, wp_post_id, "[WordPress] post already gone");
            return Ok(false);
        }
        if !status.is_success() {
            return Err(upstream_error::<WpErrorBody>(UPSTREAM, status, resp).await);
        }

        info!(channel = UPSTREAM, wp_post_id, "[WordPress] post deleted");
        Ok(true)
    }
}
