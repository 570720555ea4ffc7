use super::views::{ArtifactSummary, DeleteView, PlanView, PostView, batch_accepted};
use crate::db::{DbBatchJob, DbEditorialPlan, DbPost, DbProject};
use crate::error::ForgeError;
use crate::pipeline::{BatchEstimate, Step};
use crate::queue::Job;
use crate::server::guards::license::LicensedProject;
use crate::server::router::ForgeState;

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;
use tracing::info;
use wpforge_schema::webhook::{
    BatchAccepted, BulkDeleteRequest, BulkDeleteResponse, EstimateRequest, JobAccepted,
    KeywordBatchRequest, RegenerateRequest,
};

const DEFAULT_PLAN_LIMIT: i64 = 20;
const MAX_PLAN_LIMIT: i64 = 100;
const MAX_ESTIMATE_POSTS: u32 = 10_000;

#[derive(Debug, Deserialize)]
pub struct CsvParams {
    /// Name recorded as the batch source, usually the uploaded file name.
    pub name: Option<String>,
    pub plan_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PlanListParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub remote: Option<bool>,
}

/// Loads a post and hides it when it belongs to another project.
async fn owned_post(
    state: &ForgeState,
    project: &DbProject,
    post_id: &str,
) -> Result<DbPost, ForgeError> {
    let post = state.db.get_post(post_id).await?;
    if post.project_id != project.id {
        return Err(ForgeError::not_found("post", post_id));
    }
    Ok(post)
}

/// POST /api/v1/keywords
pub async fn submit_keywords(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    payload: Result<Json<KeywordBatchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<BatchAccepted>), ForgeError> {
    let Json(req) = payload?;
    let submission = state
        .batches
        .submit_keywords(&project, &req.keywords, req.plan_name, req.start_date)
        .await?;
    state.queue.enqueue(Job::ProcessBatch {
        batch_id: submission.created.batch.id.clone(),
    })?;
    Ok((StatusCode::ACCEPTED, Json(batch_accepted(submission))))
}

/// POST /api/v1/batches/csv
///
/// The body is the raw CSV file. Column names are matched case-insensitively; only
/// `keyword` is required.
pub async fn submit_csv(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    Query(params): Query<CsvParams>,
    body: Bytes,
) -> Result<(StatusCode, Json<BatchAccepted>), ForgeError> {
    if body.is_empty() {
        return Err(ForgeError::BadRequest("empty CSV body".to_string()));
    }
    let source_name = params
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| "csv".to_string());
    let submission = state
        .batches
        .submit_csv(&project, &source_name, &body, params.plan_name)
        .await?;
    state.queue.enqueue(Job::ProcessBatch {
        batch_id: submission.created.batch.id.clone(),
    })?;
    Ok((StatusCode::ACCEPTED, Json(batch_accepted(submission))))
}

/// GET /api/v1/batches/{id}
pub async fn get_batch(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    Path(batch_id): Path<String>,
) -> Result<Json<DbBatchJob>, ForgeError> {
    let batch = state.db.get_batch(&batch_id).await?;
    if batch.project_id != project.id {
        return Err(ForgeError::not_found("batch", batch_id));
    }
    Ok(Json(batch))
}

/// GET /api/v1/plans
pub async fn list_plans(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    Query(params): Query<PlanListParams>,
) -> Result<Json<Vec<DbEditorialPlan>>, ForgeError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_PLAN_LIMIT)
        .clamp(1, MAX_PLAN_LIMIT);
    let plans = state.db.list_plans(&project.id, limit).await?;
    Ok(Json(plans))
}

/// GET /api/v1/plans/{id}
pub async fn get_plan(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    Path(plan_id): Path<String>,
) -> Result<Json<PlanView>, ForgeError> {
    let (plan, items) = state.db.get_plan(&plan_id).await?;
    if plan.project_id != project.id {
        return Err(ForgeError::not_found("plan", plan_id));
    }
    Ok(Json(PlanView { plan, items }))
}

/// GET /api/v1/posts/{id}
pub async fn get_post(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    Path(post_id): Path<String>,
) -> Result<Json<PostView>, ForgeError> {
    let post = owned_post(&state, &project, &post_id).await?;
    let artifacts = state.db.list_artifacts(&post.id).await?;
    Ok(Json(PostView::new(post, artifacts)))
}

/// POST /api/v1/posts/{id}/publish
pub async fn publish_post(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    Path(post_id): Path<String>,
) -> Result<(StatusCode, Json<JobAccepted>), ForgeError> {
    let post = owned_post(&state, &project, &post_id).await?;
    let job = Job::Publish { post_id: post.id };
    let accepted = JobAccepted {
        post_id: post_id.clone(),
        job: job.name().to_string(),
    };
    state.queue.enqueue(job)?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /api/v1/posts/{id}/regenerate
pub async fn regenerate_post(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    Path(post_id): Path<String>,
    payload: Result<Json<RegenerateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobAccepted>), ForgeError> {
    let Json(req) = payload?;
    let step: Step = req.step.parse().map_err(ForgeError::BadRequest)?;
    if step == Step::Publish {
        return Err(ForgeError::BadRequest(
            "publish is not a generation step; use /publish".to_string(),
        ));
    }

    let post = owned_post(&state, &project, &post_id).await?;
    let job = Job::Regenerate {
        post_id: post.id,
        step,
    };
    let accepted = JobAccepted {
        post_id: post_id.clone(),
        job: job.name().to_string(),
    };
    state.queue.enqueue(job)?;
    info!(post_id = %post_id, step = %step, "regeneration queued");
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /api/v1/posts/{id}/artifacts/{artifact_id}/activate
pub async fn activate_artifact(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    Path((post_id, artifact_id)): Path<(String, String)>,
) -> Result<Json<ArtifactSummary>, ForgeError> {
    let post = owned_post(&state, &project, &post_id).await?;
    let artifact = state.runner.activate_artifact(&post.id, &artifact_id).await?;
    Ok(Json(artifact.into()))
}

/// DELETE /api/v1/posts/{id}
pub async fn delete_post(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    Path(post_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<DeleteView>, ForgeError> {
    let post = owned_post(&state, &project, &post_id).await?;
    let remote_deleted = state
        .runner
        .delete_post(&post.id, params.remote.unwrap_or(true))
        .await?;
    Ok(Json(DeleteView {
        post_id,
        deleted: true,
        remote_deleted,
    }))
}

/// POST /api/v1/posts/bulk-delete
pub async fn bulk_delete(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    payload: Result<Json<BulkDeleteRequest>, JsonRejection>,
) -> Result<Json<BulkDeleteResponse>, ForgeError> {
    let Json(req) = payload?;
    let outcome = state
        .runner
        .bulk_delete(&project.id, &req.ids, req.remote)
        .await?;
    Ok(Json(BulkDeleteResponse {
        deleted: outcome.deleted,
        remote_deleted: outcome.remote_deleted,
        not_found: outcome.not_found,
        failed: outcome.failed,
    }))
}

/// POST /api/v1/estimate
pub async fn estimate(
    State(state): State<ForgeState>,
    LicensedProject(project): LicensedProject,
    payload: Result<Json<EstimateRequest>, JsonRejection>,
) -> Result<Json<BatchEstimate>, ForgeError> {
    let Json(req) = payload?;
    if req.posts == 0 || req.posts > MAX_ESTIMATE_POSTS {
        return Err(ForgeError::BadRequest(format!(
            "posts must be between 1 and {MAX_ESTIMATE_POSTS}"
        )));
    }
    let estimate = state
        .runner
        .costs()
        .estimate_batch(&project.settings.0, req.posts);
    Ok(Json(estimate))
}
