use sqlx::SqlitePool;

use crate::db::models::{DbEditorialPlan, DbEditorialPlanItem, PlanItemStatus};
use crate::error::ForgeError;

pub(in crate::db) async fn list_plans(
    pool: &SqlitePool,
    project_id: &str,
    limit: i64,
) -> Result<Vec<DbEditorialPlan>, ForgeError> {
    let rows = sqlx::query_as::<_, DbEditorialPlan>(
        r#"
        SELECT id, project_id, batch_job_id, name, created_at
        FROM editorial_plans
        WHERE project_id = ?
        ORDER BY created_at DESC
        LIMIT ?
        "#,
    )
    .bind(project_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

pub(in crate::db) async fn get_plan(
    pool: &SqlitePool,
    plan_id: &str,
) -> Result<(DbEditorialPlan, Vec<DbEditorialPlanItem>), ForgeError> {
    let plan = sqlx::query_as::<_, DbEditorialPlan>(
        "SELECT id, project_id, batch_job_id, name, created_at FROM editorial_plans WHERE id = ?",
    )
    .bind(plan_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ForgeError::not_found("plan", plan_id))?;

    let items = sqlx::query_as::<_, DbEditorialPlanItem>(
        r#"
        SELECT id, plan_id, post_id, keyword, position, scheduled_for, status
        FROM editorial_plan_items
        WHERE plan_id = ?
        ORDER BY position
        "#,
    )
    .bind(plan_id)
    .fetch_all(pool)
    .await?;

    Ok((plan, items))
}

pub(in crate::db) async fn set_plan_item_status(
    pool: &SqlitePool,
    post_id: &str,
    status: PlanItemStatus,
) -> Result<(), ForgeError> {
    sqlx::query("UPDATE editorial_plan_items SET status = ? WHERE post_id = ?")
        .bind(status)
        .bind(post_id)
        .execute(pool)
        .await?;
    Ok(())
}
