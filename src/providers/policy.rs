use reqwest::StatusCode;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use wpforge_schema::{OpenRouterErrorBody, WpErrorBody};

use crate::error::ForgeError;
use crate::utils::logging::with_pretty_json_debug;

pub const UPSTREAM_BODY_PREVIEW_CHARS: usize = 300;

/// Structured error body an upstream returns alongside a non-success status.
pub trait UpstreamErrorBody: std::fmt::Debug + DeserializeOwned + Serialize {
    fn message(&self) -> Option<&str>;
}

impl UpstreamErrorBody for OpenRouterErrorBody {
    fn message(&self) -> Option<&str> {
        self.inner.message.as_deref()
    }
}

impl UpstreamErrorBody for WpErrorBody {
    fn message(&self) -> Option<&str> {
        (!self.message.is_empty()).then_some(self.message.as_str())
    }
}

impl UpstreamErrorBody for Value {
    fn message(&self) -> Option<&str> {
        self.get("message")
            .or_else(|| self.get("error"))
            .and_then(Value::as_str)
    }
}

pub(crate) fn preview(raw: &str) -> String {
    format!("{:.len$}", raw, len = UPSTREAM_BODY_PREVIEW_CHARS)
}

/// Passes successful responses through; turns anything else into `ForgeError::UpstreamStatus`
/// carrying the upstream's own message when its body parses as `E`.
pub(crate) async fn ensure_success<E>(
    upstream: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ForgeError>
where
    E: UpstreamErrorBody,
{
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    Err(upstream_error::<E>(upstream, status, resp).await)
}

pub(crate) async fn upstream_error<E>(
    upstream: &'static str,
    status: StatusCode,
    resp: reqwest::Response,
) -> ForgeError
where
    E: UpstreamErrorBody,
{
    let bytes = resp.bytes().await.unwrap_or_default();
    let raw_body = String::from_utf8_lossy(&bytes);

    let body = match serde_json::from_slice::<E>(&bytes) {
        Ok(error) => {
            with_pretty_json_debug(&error, |pretty_error| {
                tracing::debug!(
                    upstream,
                    %status,
                    body = %pretty_error,
                    "Upstream structured error"
                );
            });
            error
                .message()
                .map(preview)
                .unwrap_or_else(|| preview(&raw_body))
        }
        Err(_) => {
            let body = preview(&raw_body);
            tracing::debug!(upstream, %status, body = %body, "Upstream unstructured error");
            body
        }
    };

    tracing::warn!(upstream, %status, body = %body, "[{upstream}] upstream call failed");
    ForgeError::UpstreamStatus {
        upstream,
        status,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_long_bodies() {
        let long = "x".repeat(UPSTREAM_BODY_PREVIEW_CHARS * 2);
        assert_eq!(preview(&long).len(), UPSTREAM_BODY_PREVIEW_CHARS);
        assert_eq!(preview("short"), "short");
    }

    #[test]
    fn generic_error_body_reads_message_or_error() {
        let v: Value = serde_json::json!({ "error": "token invalid" });
        assert_eq!(v.message(), Some("token invalid"));

        let v: Value = serde_json::json!({ "message": "nope", "error": "ignored" });
        assert_eq!(v.message(), Some("nope"));
    }

    #[test]
    fn wordpress_error_body_message() {
        let body: WpErrorBody = serde_json::from_str(
            r#"{"code":"rest_cannot_create","message":"Sorry, you are not allowed.","data":{"status":401}}"#,
        )
        .unwrap();
        assert_eq!(body.message(), Some("Sorry, you are not allowed."));
    }
}
