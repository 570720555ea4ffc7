use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{FromRow, types::Json};

use crate::pipeline::Step;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PostStatus {
    Pending,
    Researching,
    Strategizing,
    Writing,
    Illustrating,
    Ready,
    Publishing,
    Published,
    Failed,
}

impl PostStatus {
    /// Status a post holds while `step` is executing.
    pub fn running(step: Step) -> Self {
        match step {
            Step::Research => PostStatus::Researching,
            Step::Strategy => PostStatus::Strategizing,
            Step::Article => PostStatus::Writing,
            Step::Image => PostStatus::Illustrating,
            Step::Publish => PostStatus::Publishing,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum BatchStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum PlanItemStatus {
    Planned,
    Generated,
    Published,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum KeyStatus {
    Reserved,
    Completed,
    Failed,
}

/// Per-project generation settings, stored as JSON on the project row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub language: String,
    pub tone: String,
    pub word_count: u32,
    pub generate_images: bool,
    pub auto_publish: bool,
    /// WordPress status for created posts (`draft`, `publish`, ...).
    pub wp_status: String,
    pub wp_category_ids: Vec<u64>,
    pub posts_per_day: u32,
    pub max_cost_per_post_usd: Option<f64>,
    /// Per-step model overrides; unset steps use `providers.openrouter.models`.
    pub research_model: Option<String>,
    pub strategy_model: Option<String>,
    pub article_model: Option<String>,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            tone: "informative".to_string(),
            word_count: 1200,
            generate_images: true,
            auto_publish: false,
            wp_status: "draft".to_string(),
            wp_category_ids: Vec::new(),
            posts_per_day: 1,
            max_cost_per_post_usd: None,
            research_model: None,
            strategy_model: None,
            article_model: None,
        }
    }
}

/// One entry of a post's `error_log`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub step: Option<Step>,
    pub code: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbAgency {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DbProject {
    pub id: String,
    pub agency_id: String,
    pub name: String,
    pub wp_url: String,
    pub wp_username: String,
    pub wp_app_password: String,
    pub license_key: String,
    pub settings: Json<ProjectSettings>,
    pub whatsapp_phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbBatchJob {
    pub id: String,
    pub project_id: String,
    pub source_name: String,
    pub status: BatchStatus,
    pub total: i64,
    pub processed: i64,
    pub failed: i64,
    pub attempts: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbPost {
    pub id: String,
    pub project_id: String,
    pub batch_job_id: Option<String>,
    pub keyword: String,
    pub title: Option<String>,
    pub status: PostStatus,
    pub wp_post_id: Option<i64>,
    pub wp_link: Option<String>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: f64,
    pub error_log: Json<Vec<ErrorEntry>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbPostArtifact {
    pub id: String,
    pub post_id: String,
    pub step: Step,
    pub version: i64,
    pub is_active: bool,
    pub content: Json<Value>,
    pub model: Option<String>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// Binary payload stored beside an artifact, kept out of `content`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, FromRow)]
pub struct ArtifactBlob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbIdempotencyKey {
    pub id: String,
    pub scope: String,
    pub key_hash: String,
    pub status: KeyStatus,
    pub result: Option<Json<Value>>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbEditorialPlan {
    pub id: String,
    pub project_id: String,
    pub batch_job_id: Option<String>,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, FromRow)]
pub struct DbEditorialPlanItem {
    pub id: String,
    pub plan_id: String,
    pub post_id: Option<String>,
    pub keyword: String,
    pub position: i64,
    pub scheduled_for: NaiveDate,
    pub status: PlanItemStatus,
}

/// Outcome of trying to reserve an idempotency key.
#[derive(Debug, Clone, PartialEq)]
pub enum Reservation {
    /// The caller now owns the key and must complete or fail it.
    Reserved,
    /// A previous run completed; carries its stored result.
    Replayed(Option<Value>),
    /// Another caller holds a fresh reservation.
    InFlight,
}
