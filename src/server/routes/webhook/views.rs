//! JSON shapes returned by the webhook API that are not plain rows.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::batch::Submission;
use crate::db::{DbEditorialPlan, DbEditorialPlanItem, DbPost, DbPostArtifact};
use crate::pipeline::Step;
use wpforge_schema::webhook::BatchAccepted;

/// Artifact metadata without its (possibly large) content.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub id: String,
    pub step: Step,
    pub version: i64,
    pub is_active: bool,
    pub model: Option<String>,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

impl From<DbPostArtifact> for ArtifactSummary {
    fn from(a: DbPostArtifact) -> Self {
        Self {
            id: a.id,
            step: a.step,
            version: a.version,
            is_active: a.is_active,
            model: a.model,
            tokens_in: a.tokens_in,
            tokens_out: a.tokens_out,
            cost_usd: a.cost_usd,
            created_at: a.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    #[serde(flatten)]
    pub post: DbPost,
    /// Active artifact per step.
    pub artifacts: Vec<ArtifactSummary>,
    /// Number of stored versions across all steps.
    pub versions: usize,
}

impl PostView {
    pub fn new(post: DbPost, artifacts: Vec<DbPostArtifact>) -> Self {
        let versions = artifacts.len();
        let artifacts = artifacts
            .into_iter()
            .filter(|a| a.is_active)
            .map(ArtifactSummary::from)
            .collect();
        Self {
            post,
            artifacts,
            versions,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanView {
    #[serde(flatten)]
    pub plan: DbEditorialPlan,
    pub items: Vec<DbEditorialPlanItem>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteView {
    pub post_id: String,
    pub deleted: bool,
    pub remote_deleted: bool,
}

pub fn batch_accepted(submission: Submission) -> BatchAccepted {
    let created = submission.created;
    BatchAccepted {
        batch_id: created.batch.id,
        plan_id: created.plan.id,
        posts: created.posts.into_iter().map(|p| p.id).collect(),
        skipped: submission.skipped,
    }
}
