use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool, types::Json};
use tracing::{debug, info};

use super::new_id;
use crate::db::models::{DbIdempotencyKey, KeyStatus, Reservation};
use crate::error::ForgeError;
use crate::pipeline::idempotency::{KeyDecision, decide};

macro_rules! key_columns {
    () => {
        "id, scope, key_hash, status, result, error, created_at, updated_at"
    };
}

/// Looks up and (re)reserves a key under a `BEGIN IMMEDIATE` transaction, which takes the
/// database write lock before the read so two processes cannot both observe "no row".
pub(in crate::db) async fn reserve_key(
    pool: &SqlitePool,
    scope: &str,
    key_hash: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<Reservation, ForgeError> {
    let mut conn = pool.acquire().await?;
    sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

    let res = reserve_locked(&mut conn, scope, key_hash, now, ttl).await;
    let end = if res.is_ok() { "COMMIT" } else { "ROLLBACK" };
    sqlx::query(end).execute(&mut *conn).await?;
    res
}

async fn reserve_locked(
    conn: &mut SqliteConnection,
    scope: &str,
    key_hash: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<Reservation, ForgeError> {
    let existing = sqlx::query_as::<_, DbIdempotencyKey>(concat!(
        "SELECT ",
        key_columns!(),
        " FROM idempotency_keys WHERE key_hash = ?"
    ))
    .bind(key_hash)
    .fetch_optional(&mut *conn)
    .await?;

    let decision = decide(
        existing.as_ref().map(|row| (row.status, row.created_at)),
        now,
        ttl,
    );
    debug!(scope, key_hash, ?decision, "idempotency decision");

    match decision {
        KeyDecision::Replay => {
            let result = existing.and_then(|row| row.result).map(|Json(v)| v);
            return Ok(Reservation::Replayed(result));
        }
        KeyDecision::RejectInFlight => return Ok(Reservation::InFlight),
        KeyDecision::Reclaim => {
            info!(scope, key_hash, "reclaiming stale or failed idempotency key");
            sqlx::query("DELETE FROM idempotency_keys WHERE key_hash = ?")
                .bind(key_hash)
                .execute(&mut *conn)
                .await?;
        }
        KeyDecision::Insert => {}
    }

    sqlx::query(concat!(
        "INSERT INTO idempotency_keys (",
        key_columns!(),
        ") VALUES (?, ?, ?, ?, NULL, NULL, ?, ?)"
    ))
    .bind(new_id())
    .bind(scope)
    .bind(key_hash)
    .bind(KeyStatus::Reserved)
    .bind(now)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Reservation::Reserved)
}

pub(in crate::db) async fn complete_key(
    pool: &SqlitePool,
    key_hash: &str,
    result: Value,
) -> Result<(), ForgeError> {
    let res = sqlx::query(
        "UPDATE idempotency_keys SET status = ?, result = ?, error = NULL, updated_at = ? \
         WHERE key_hash = ?",
    )
    .bind(KeyStatus::Completed)
    .bind(Json(result))
    .bind(Utc::now())
    .bind(key_hash)
    .execute(pool)
    .await?;

    if res.rows_affected() == 0 {
        return Err(ForgeError::not_found("idempotency key", key_hash));
    }
    Ok(())
}

pub(in crate::db) async fn fail_key(
    pool: &SqlitePool,
    key_hash: &str,
    error: String,
) -> Result<(), ForgeError> {
    sqlx::query("UPDATE idempotency_keys SET status = ?, error = ?, updated_at = ? WHERE key_hash = ?")
        .bind(KeyStatus::Failed)
        .bind(error)
        .bind(Utc::now())
        .bind(key_hash)
        .execute(pool)
        .await?;
    Ok(())
}

pub(in crate::db) async fn get_key(
    pool: &SqlitePool,
    key_hash: &str,
) -> Result<Option<DbIdempotencyKey>, ForgeError> {
    let row = sqlx::query_as::<_, DbIdempotencyKey>(concat!(
        "SELECT ",
        key_columns!(),
        " FROM idempotency_keys WHERE key_hash = ?"
    ))
    .bind(key_hash)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}
