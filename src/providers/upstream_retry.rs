use backon::{ExponentialBuilder, Retryable};
use std::time::Duration;

use crate::error::ForgeError;
use crate::providers::policy::preview;

pub(crate) fn network_retry_policy(retry_max_times: usize) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(2))
        .with_max_times(retry_max_times)
        .with_jitter()
}

/// Which failures an inline retry may resend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryOn {
    /// Connect/timeout failures and 5xx statuses.
    Transient,
    /// Only connect failures: the server never saw the request. For writes that create
    /// something remotely, where a resend after a timeout could create it twice.
    Unsent,
}

impl RetryOn {
    fn admits(self, err: &ForgeError) -> bool {
        match (self, err) {
            (RetryOn::Transient, ForgeError::ReqwestError(e)) => {
                e.is_connect() || e.is_timeout() || e.is_request()
            }
            (RetryOn::Transient, ForgeError::UpstreamStatus { status, .. }) => {
                status.is_server_error()
            }
            (RetryOn::Unsent, ForgeError::ReqwestError(e)) => e.is_connect(),
            _ => false,
        }
    }
}

/// Sends the request produced by `build`, rebuilding it for every attempt.
///
/// 5xx responses are consumed and returned as `UpstreamStatus` once retries are exhausted;
/// other statuses are handed back to the caller untouched.
pub(crate) async fn send_with_retry<F>(
    upstream: &'static str,
    policy: ExponentialBuilder,
    build: F,
) -> Result<reqwest::Response, ForgeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    send_with_retry_on(upstream, policy, RetryOn::Transient, build).await
}

/// `send_with_retry` with an explicit resend rule.
pub(crate) async fn send_with_retry_on<F>(
    upstream: &'static str,
    policy: ExponentialBuilder,
    retry_on: RetryOn,
    build: F,
) -> Result<reqwest::Response, ForgeError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let build = &build;
    (move || async move {
        let resp = build().send().await?;

        if resp.status().is_server_error() {
            let status = resp.status();
            let url = resp.url().clone();
            let body = match resp.bytes().await {
                Ok(bytes) => preview(&String::from_utf8_lossy(&bytes)),
                Err(e) => format!("<failed to read body: {e}>"),
            };

            tracing::debug!(
                upstream,
                %status,
                url = %url,
                body = %body,
                "[{upstream}] Upstream server error"
            );

            return Err(ForgeError::UpstreamStatus {
                upstream,
                status,
                body,
            });
        }

        Ok(resp)
    })
    .retry(policy)
    .when(|err| retry_on.admits(err))
    .notify(|err, delay| {
        tracing::debug!(upstream, error = %err, ?delay, "[{upstream}] retrying upstream call");
    })
    .await
}
