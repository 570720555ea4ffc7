use chrono::Utc;
use sqlx::{SqlitePool, types::Json};
use tracing::debug;

use super::{artifact_columns, new_id};
use crate::db::models::{ArtifactBlob, DbPostArtifact};
use crate::db::patch::ArtifactCreate;
use crate::error::ForgeError;
use crate::pipeline::Step;

/// Writes the next version of a step's artifact, makes it the active one and adds its
/// usage to the post totals, all in one transaction.
pub(in crate::db) async fn insert_artifact(
    pool: &SqlitePool,
    create: ArtifactCreate,
) -> Result<DbPostArtifact, ForgeError> {
    let mut tx = pool.begin().await?;

    let post_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM posts WHERE id = ?")
        .bind(&create.post_id)
        .fetch_optional(&mut *tx)
        .await?;
    if post_exists.is_none() {
        return Err(ForgeError::not_found("post", create.post_id));
    }

    let current: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) FROM post_artifacts WHERE post_id = ? AND step = ?",
    )
    .bind(&create.post_id)
    .bind(create.step)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE post_artifacts SET is_active = 0 WHERE post_id = ? AND step = ? AND is_active = 1",
    )
    .bind(&create.post_id)
    .bind(create.step)
    .execute(&mut *tx)
    .await?;

    let artifact = DbPostArtifact {
        id: new_id(),
        post_id: create.post_id,
        step: create.step,
        version: current + 1,
        is_active: true,
        content: Json(create.content),
        model: create.model,
        tokens_in: create.tokens_in,
        tokens_out: create.tokens_out,
        cost_usd: create.cost_usd,
        created_at: Utc::now(),
    };

    sqlx::query(concat!(
        "INSERT INTO post_artifacts (",
        artifact_columns!(),
        ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&artifact.id)
    .bind(&artifact.post_id)
    .bind(artifact.step)
    .bind(artifact.version)
    .bind(artifact.is_active)
    .bind(&artifact.content)
    .bind(&artifact.model)
    .bind(artifact.tokens_in)
    .bind(artifact.tokens_out)
    .bind(artifact.cost_usd)
    .bind(artifact.created_at)
    .execute(&mut *tx)
    .await?;

    if let Some(blob) = &create.blob {
        sqlx::query("INSERT INTO artifact_blobs (artifact_id, content_type, bytes) VALUES (?, ?, ?)")
            .bind(&artifact.id)
            .bind(&blob.content_type)
            .bind(&blob.bytes)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        r#"
        UPDATE posts
        SET
            tokens_in = tokens_in + ?,
            tokens_out = tokens_out + ?,
            cost_usd = cost_usd + ?,
            updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(artifact.tokens_in)
    .bind(artifact.tokens_out)
    .bind(artifact.cost_usd)
    .bind(artifact.created_at)
    .bind(&artifact.post_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    debug!(
        post_id = %artifact.post_id,
        step = %artifact.step,
        version = artifact.version,
        cost_usd = artifact.cost_usd,
        blob_bytes = create.blob.as_ref().map_or(0, |b| b.bytes.len()),
        "artifact stored"
    );

    Ok(artifact)
}

pub(in crate::db) async fn active_artifact(
    pool: &SqlitePool,
    post_id: &str,
    step: Step,
) -> Result<Option<DbPostArtifact>, ForgeError> {
    let row = sqlx::query_as::<_, DbPostArtifact>(concat!(
        "SELECT ",
        artifact_columns!(),
        " FROM post_artifacts WHERE post_id = ? AND step = ? AND is_active = 1"
    ))
    .bind(post_id)
    .bind(step)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

pub(in crate::db) async fn list_artifacts(
    pool: &SqlitePool,
    post_id: &str,
) -> Result<Vec<DbPostArtifact>, ForgeError> {
    let rows = sqlx::query_as::<_, DbPostArtifact>(concat!(
        "SELECT ",
        artifact_columns!(),
        " FROM post_artifacts WHERE post_id = ? ORDER BY created_at, version"
    ))
    .bind(post_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub(in crate::db) async fn artifact_blob(
    pool: &SqlitePool,
    artifact_id: &str,
) -> Result<Option<ArtifactBlob>, ForgeError> {
    let row = sqlx::query_as::<_, ArtifactBlob>(
        "SELECT content_type, bytes FROM artifact_blobs WHERE artifact_id = ?",
    )
    .bind(artifact_id)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

/// The version the next `insert_artifact` for this step will receive.
pub(in crate::db) async fn next_artifact_version(
    pool: &SqlitePool,
    post_id: &str,
    step: Step,
) -> Result<i64, ForgeError> {
    let current: i64 = sqlx::query_scalar(
        "SELECT COALESCE(MAX(version), 0) FROM post_artifacts WHERE post_id = ? AND step = ?",
    )
    .bind(post_id)
    .bind(step)
    .fetch_one(pool)
    .await?;

    Ok(current + 1)
}

/// Makes an existing version the active artifact of its step.
pub(in crate::db) async fn activate_artifact(
    pool: &SqlitePool,
    post_id: &str,
    artifact_id: &str,
) -> Result<DbPostArtifact, ForgeError> {
    let mut tx = pool.begin().await?;

    let step: Option<Step> =
        sqlx::query_scalar("SELECT step FROM post_artifacts WHERE id = ? AND post_id = ?")
            .bind(artifact_id)
            .bind(post_id)
            .fetch_optional(&mut *tx)
            .await?;
    let Some(step) = step else {
        return Err(ForgeError::not_found("artifact", artifact_id));
    };

    sqlx::query(
        "UPDATE post_artifacts SET is_active = 0 WHERE post_id = ? AND step = ? AND is_active = 1",
    )
    .bind(post_id)
    .bind(step)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE post_artifacts SET is_active = 1 WHERE id = ?")
        .bind(artifact_id)
        .execute(&mut *tx)
        .await?;

    let artifact = sqlx::query_as::<_, DbPostArtifact>(concat!(
        "SELECT ",
        artifact_columns!(),
        " FROM post_artifacts WHERE id = ?"
    ))
    .bind(artifact_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(artifact)
}
