use chrono::Utc;
use sqlx::{SqlitePool, types::Json};
use tracing::debug;

use super::{batch_columns, new_id, post_columns};
use crate::db::models::{
    BatchStatus, DbBatchJob, DbEditorialPlan, DbPost, ErrorEntry, PlanItemStatus, PostStatus,
};
use crate::db::patch::{BatchCreate, BatchCreated, BatchItemOutcome, PostPatch};
use crate::error::ForgeError;

/// Creates the batch job, its posts and the editorial plan in one transaction.
pub(in crate::db) async fn create_batch(
    pool: &SqlitePool,
    create: BatchCreate,
) -> Result<BatchCreated, ForgeError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let batch = DbBatchJob {
        id: new_id(),
        project_id: create.project_id.clone(),
        source_name: create.source_name,
        status: BatchStatus::Queued,
        total: i64::try_from(create.items.len()).unwrap_or(i64::MAX),
        processed: 0,
        failed: 0,
        attempts: 0,
        error: None,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(concat!(
        "INSERT INTO batch_jobs (",
        batch_columns!(),
        ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&batch.id)
    .bind(&batch.project_id)
    .bind(&batch.source_name)
    .bind(batch.status)
    .bind(batch.total)
    .bind(batch.processed)
    .bind(batch.failed)
    .bind(batch.attempts)
    .bind(&batch.error)
    .bind(batch.created_at)
    .bind(batch.updated_at)
    .execute(&mut *tx)
    .await?;

    let plan = DbEditorialPlan {
        id: new_id(),
        project_id: create.project_id.clone(),
        batch_job_id: Some(batch.id.clone()),
        name: create.plan_name,
        created_at: now,
    };

    sqlx::query(
        "INSERT INTO editorial_plans (id, project_id, batch_job_id, name, created_at) \
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&plan.id)
    .bind(&plan.project_id)
    .bind(&plan.batch_job_id)
    .bind(&plan.name)
    .bind(plan.created_at)
    .execute(&mut *tx)
    .await?;

    let mut posts = Vec::with_capacity(create.items.len());
    for (position, item) in create.items.into_iter().enumerate() {
        let post = DbPost {
            id: new_id(),
            project_id: create.project_id.clone(),
            batch_job_id: Some(batch.id.clone()),
            keyword: item.keyword,
            title: item.title,
            status: PostStatus::Pending,
            wp_post_id: None,
            wp_link: None,
            tokens_in: 0,
            tokens_out: 0,
            cost_usd: 0.0,
            error_log: Json(Vec::new()),
            created_at: now,
            updated_at: now,
        };

        sqlx::query(concat!(
            "INSERT INTO posts (",
            post_columns!(),
            ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&post.id)
        .bind(&post.project_id)
        .bind(&post.batch_job_id)
        .bind(&post.keyword)
        .bind(&post.title)
        .bind(post.status)
        .bind(post.wp_post_id)
        .bind(&post.wp_link)
        .bind(post.tokens_in)
        .bind(post.tokens_out)
        .bind(post.cost_usd)
        .bind(&post.error_log)
        .bind(post.created_at)
        .bind(post.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO editorial_plan_items \
             (id, plan_id, post_id, keyword, position, scheduled_for, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(&plan.id)
        .bind(&post.id)
        .bind(&post.keyword)
        .bind(i64::try_from(position).unwrap_or(i64::MAX))
        .bind(item.scheduled_for)
        .bind(PlanItemStatus::Planned)
        .execute(&mut *tx)
        .await?;

        posts.push(post);
    }

    tx.commit().await?;

    debug!(
        batch_id = %batch.id,
        plan_id = %plan.id,
        posts = posts.len(),
        "batch created"
    );

    Ok(BatchCreated { batch, plan, posts })
}

pub(in crate::db) async fn get_post(pool: &SqlitePool, id: &str) -> Result<DbPost, ForgeError> {
    sqlx::query_as::<_, DbPost>(concat!(
        "SELECT ",
        post_columns!(),
        " FROM posts WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ForgeError::not_found("post", id))
}

pub(in crate::db) async fn list_batch_posts(
    pool: &SqlitePool,
    batch_id: &str,
) -> Result<Vec<DbPost>, ForgeError> {
    let rows = sqlx::query_as::<_, DbPost>(concat!(
        "SELECT ",
        post_columns!(),
        " FROM posts WHERE batch_job_id = ? ORDER BY created_at, id"
    ))
    .bind(batch_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub(in crate::db) async fn patch_post(
    pool: &SqlitePool,
    id: &str,
    patch: PostPatch,
) -> Result<(), ForgeError> {
    let PostPatch {
        status,
        title,
        wp_post_id,
        wp_link,
    } = patch;

    let status_set = status.is_some();
    let updated_at = Utc::now();

    let res = sqlx::query(
        r#"
        UPDATE posts
        SET
            status = COALESCE(?, status),
            title = COALESCE(?, title),
            wp_post_id = COALESCE(?, wp_post_id),
            wp_link = COALESCE(?, wp_link),
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(status)
    .bind(title)
    .bind(wp_post_id)
    .bind(wp_link)
    .bind(updated_at)
    .bind(id)
    .execute(pool)
    .await?;

    let affected = res.rows_affected();
    debug!(post_id = id, affected, status_set, "post patch applied");

    if affected == 0 {
        return Err(ForgeError::not_found("post", id));
    }
    Ok(())
}

pub(in crate::db) async fn append_post_error(
    pool: &SqlitePool,
    id: &str,
    entry: ErrorEntry,
) -> Result<(), ForgeError> {
    let encoded = serde_json::to_string(&entry)?;
    let res = sqlx::query(
        "UPDATE posts SET error_log = json_insert(error_log, '$[#]', json(?)), updated_at = ? \
         WHERE id = ?",
    )
    .bind(encoded)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(ForgeError::not_found("post", id));
    }
    Ok(())
}

/// Returns whether a row was deleted. Artifacts cascade.
pub(in crate::db) async fn delete_post(pool: &SqlitePool, id: &str) -> Result<bool, ForgeError> {
    let res = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

pub(in crate::db) async fn get_batch(
    pool: &SqlitePool,
    id: &str,
) -> Result<DbBatchJob, ForgeError> {
    sqlx::query_as::<_, DbBatchJob>(concat!(
        "SELECT ",
        batch_columns!(),
        " FROM batch_jobs WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ForgeError::not_found("batch", id))
}

pub(in crate::db) async fn mark_batch_running(
    pool: &SqlitePool,
    id: &str,
) -> Result<DbBatchJob, ForgeError> {
    let res = sqlx::query(
        "UPDATE batch_jobs SET status = ?, attempts = attempts + 1, updated_at = ? WHERE id = ?",
    )
    .bind(BatchStatus::Running)
    .bind(Utc::now())
    .bind(id)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(ForgeError::not_found("batch", id));
    }
    get_batch(pool, id).await
}

pub(in crate::db) async fn fail_batch(
    pool: &SqlitePool,
    id: &str,
    error: String,
) -> Result<(), ForgeError> {
    sqlx::query("UPDATE batch_jobs SET status = ?, error = ?, updated_at = ? WHERE id = ?")
        .bind(BatchStatus::Failed)
        .bind(error)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Counts one finished member of a batch and closes the batch once every post has finished.
///
/// A batch in which every post failed ends `failed`; otherwise `completed`.
pub(in crate::db) async fn record_batch_item(
    pool: &SqlitePool,
    batch_id: &str,
    post_id: &str,
    outcome: BatchItemOutcome,
) -> Result<DbBatchJob, ForgeError> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let counter = match outcome {
        BatchItemOutcome::Processed => {
            "UPDATE batch_jobs SET processed = processed + 1, updated_at = ? WHERE id = ?"
        }
        BatchItemOutcome::Failed => {
            "UPDATE batch_jobs SET failed = failed + 1, updated_at = ? WHERE id = ?"
        }
    };
    let res = sqlx::query(counter)
        .bind(now)
        .bind(batch_id)
        .execute(&mut *tx)
        .await?;
    if res.rows_affected() == 0 {
        return Err(ForgeError::not_found("batch", batch_id));
    }

    sqlx::query(
        r#"
        UPDATE batch_jobs
        SET status = CASE
            WHEN processed + failed < total THEN status
            WHEN failed >= total THEN 'failed'
            ELSE 'completed'
        END
        WHERE id = ?
        "#,
    )
    .bind(batch_id)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE editorial_plan_items SET status = ? WHERE post_id = ?")
        .bind(outcome.plan_status())
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    get_batch(pool, batch_id).await
}
