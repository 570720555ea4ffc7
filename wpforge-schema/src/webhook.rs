//! Request/response bodies of the plugin-facing webhook API.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordBatchRequest {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub plan_name: Option<String>,
    /// First publication day of the editorial plan; defaults to tomorrow.
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAccepted {
    pub batch_id: String,
    pub plan_id: String,
    pub posts: Vec<String>,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerateRequest {
    pub step: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkDeleteRequest {
    pub ids: Vec<String>,
    #[serde(default = "default_remote")]
    pub remote: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkDeleteResponse {
    pub deleted: usize,
    pub remote_deleted: usize,
    pub not_found: usize,
    /// Posts left in place because their delete failed.
    #[serde(default)]
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimateRequest {
    #[serde(default = "default_posts")]
    pub posts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAccepted {
    pub post_id: String,
    pub job: String,
}

fn default_remote() -> bool {
    true
}

fn default_posts() -> u32 {
    1
}
