use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::models::{
    ArtifactBlob, DbBatchJob, DbEditorialPlan, DbPost, PlanItemStatus, PostStatus,
    ProjectSettings,
};
use crate::pipeline::Step;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgencyCreate {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectCreate {
    pub agency_id: String,
    pub name: String,
    pub wp_url: String,
    pub wp_username: String,
    pub wp_app_password: String,
    /// Generated when absent.
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default)]
    pub whatsapp_phone: Option<String>,
}

/// One keyword that becomes a post and an editorial plan item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPost {
    pub keyword: String,
    pub title: Option<String>,
    pub scheduled_for: NaiveDate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchCreate {
    pub project_id: String,
    pub source_name: String,
    pub plan_name: String,
    pub items: Vec<PlannedPost>,
}

#[derive(Debug, Clone)]
pub struct BatchCreated {
    pub batch: DbBatchJob,
    pub plan: DbEditorialPlan,
    pub posts: Vec<DbPost>,
}

/// Partial post update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostPatch {
    pub status: Option<PostStatus>,
    pub title: Option<String>,
    pub wp_post_id: Option<i64>,
    pub wp_link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactCreate {
    pub post_id: String,
    pub step: Step,
    pub content: Value,
    pub model: Option<String>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: f64,
    /// Written in the same transaction as the artifact row.
    #[serde(default, skip_serializing)]
    pub blob: Option<ArtifactBlob>,
}

/// Final outcome of a batch member, counted on the batch row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchItemOutcome {
    Processed,
    Failed,
}

impl BatchItemOutcome {
    pub fn plan_status(self) -> PlanItemStatus {
        match self {
            BatchItemOutcome::Processed => PlanItemStatus::Generated,
            BatchItemOutcome::Failed => PlanItemStatus::Failed,
        }
    }
}
