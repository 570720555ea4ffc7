use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error as ThisError;

use super::IsRetryable;
use crate::pipeline::Step;

#[derive(Debug, ThisError)]
pub enum ForgeError {
    #[error("[{upstream}] upstream error with status {status}: {body}")]
    UpstreamStatus {
        upstream: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("HTTP request error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Ractor error: {0}")]
    RactorError(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Operation already in flight for scope {scope}")]
    DuplicateInFlight { scope: String },

    #[error("Post {post_id} has no active {step} artifact")]
    MissingArtifact { post_id: String, step: Step },

    #[error("Estimated cost {estimate_usd:.4} USD exceeds the per-post limit {limit_usd:.4} USD")]
    BudgetExceeded { estimate_usd: f64, limit_usd: f64 },

    #[error("Malformed {step} output: {reason}")]
    MalformedOutput { step: Step, reason: String },

    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl ForgeError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Short code stored in `error_log` entries and returned in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ForgeError::UpstreamStatus { status, .. } => match *status {
                StatusCode::TOO_MANY_REQUESTS => "RATE_LIMIT",
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "UPSTREAM_AUTH",
                StatusCode::PAYMENT_REQUIRED => "UPSTREAM_CREDITS",
                _ => "UPSTREAM_ERROR",
            },
            ForgeError::ReqwestError(_) | ForgeError::UrlError(_) => "UPSTREAM_ERROR",
            ForgeError::JsonError(_) => "BAD_PAYLOAD",
            ForgeError::CsvError(_) | ForgeError::BadRequest(_) => "BAD_REQUEST",
            ForgeError::NotFound { .. } => "NOT_FOUND",
            ForgeError::DuplicateInFlight { .. } => "DUPLICATE_IN_FLIGHT",
            ForgeError::MissingArtifact { .. } => "MISSING_ARTIFACT",
            ForgeError::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            ForgeError::MalformedOutput { .. } => "MALFORMED_OUTPUT",
            ForgeError::DatabaseError(_)
            | ForgeError::RactorError(_)
            | ForgeError::UnexpectedError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<JsonRejection> for ForgeError {
    fn from(rejection: JsonRejection) -> Self {
        ForgeError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ForgeError {
    fn into_response(self) -> axum::response::Response {
        let code = self.code().to_string();
        let (status, message, details) = match &self {
            ForgeError::DatabaseError(_)
            | ForgeError::RactorError(_)
            | ForgeError::UnexpectedError(_) => {
                tracing::error!(error = %self, "internal error while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An internal server error occurred.".to_string(),
                    None,
                )
            }

            ForgeError::NotFound { entity, .. } => {
                (StatusCode::NOT_FOUND, format!("{entity} not found."), None)
            }

            ForgeError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone(), None),

            ForgeError::CsvError(e) => (StatusCode::BAD_REQUEST, format!("invalid CSV: {e}"), None),

            ForgeError::DuplicateInFlight { scope } => (
                StatusCode::CONFLICT,
                "The same operation is already in progress.".to_string(),
                Some(json!({ "scope": scope })),
            ),

            ForgeError::MissingArtifact { step, .. } => (
                StatusCode::CONFLICT,
                format!("The {step} step has not produced output yet."),
                Some(json!({ "step": step })),
            ),

            ForgeError::BudgetExceeded {
                estimate_usd,
                limit_usd,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Estimated cost exceeds the project's per-post limit.".to_string(),
                Some(json!({ "estimate_usd": estimate_usd, "limit_usd": limit_usd })),
            ),

            ForgeError::JsonError(_) | ForgeError::MalformedOutput { .. } => (
                StatusCode::BAD_GATEWAY,
                "Failed to parse upstream response.".to_string(),
                None,
            ),

            ForgeError::UpstreamStatus {
                upstream, status, ..
            } => (
                StatusCode::BAD_GATEWAY,
                format!("{upstream} returned {status}."),
                Some(json!({ "upstream": upstream, "status": status.as_u16() })),
            ),

            ForgeError::ReqwestError(_) | ForgeError::UrlError(_) => (
                StatusCode::BAD_GATEWAY,
                "Upstream service error.".to_string(),
                None,
            ),
        };

        let body = ApiErrorObject {
            code,
            message,
            details,
        };
        (status, Json(ApiErrorBody { inner: body })).into_response()
    }
}

/// Standardized API error response payload.
#[derive(Serialize)]
pub struct ApiErrorObject {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Serialize)]
pub struct ApiErrorBody {
    #[serde(rename = "error")]
    pub inner: ApiErrorObject,
}

impl IsRetryable for ForgeError {
    fn is_retryable(&self) -> bool {
        match self {
            ForgeError::ReqwestError(_) => true,
            ForgeError::UpstreamStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || status.is_server_error()
            }
            // Another worker holds the key; try again once it has finished or gone stale.
            ForgeError::DuplicateInFlight { .. } => true,
            // Models occasionally answer with prose instead of JSON.
            ForgeError::MalformedOutput { .. } => true,
            ForgeError::DatabaseError(e) => {
                matches!(e, sqlx::Error::PoolTimedOut | sqlx::Error::Io(_))
            }
            _ => false,
        }
    }
}
