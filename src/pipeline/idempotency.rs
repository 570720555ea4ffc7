use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::{DbActorHandle, KeyStatus, Reservation};
use crate::error::ForgeError;

/// Hex SHA-256 of `scope:v1:v2:...`.
pub fn idempotency_key<I, S>(scope: &str, values: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let joined = values
        .into_iter()
        .map(|v| v.as_ref().to_string())
        .collect::<Vec<_>>()
        .join(":");
    hex::encode(Sha256::digest(format!("{scope}:{joined}").as_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecision {
    /// No row yet.
    Insert,
    /// A completed run exists; hand back its result.
    Replay,
    /// A fresh reservation is held by someone else.
    RejectInFlight,
    /// Stale reservation or failed run: delete and reserve again.
    Reclaim,
}

/// What to do with the existing key row `(status, created_at)`, if any.
pub fn decide(
    existing: Option<(KeyStatus, DateTime<Utc>)>,
    now: DateTime<Utc>,
    ttl: chrono::Duration,
) -> KeyDecision {
    match existing {
        None => KeyDecision::Insert,
        Some((KeyStatus::Completed, _)) => KeyDecision::Replay,
        Some((KeyStatus::Failed, _)) => KeyDecision::Reclaim,
        Some((KeyStatus::Reserved, created_at)) if now - created_at < ttl => {
            KeyDecision::RejectInFlight
        }
        Some((KeyStatus::Reserved, _)) => KeyDecision::Reclaim,
    }
}

/// Result of a guarded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Guarded<T> {
    /// The operation ran now.
    Fresh(T),
    /// A previous run completed; this is its stored result.
    Replayed(T),
}

impl<T> Guarded<T> {
    pub fn into_inner(self) -> T {
        match self {
            Guarded::Fresh(v) | Guarded::Replayed(v) => v,
        }
    }

    pub fn is_replayed(&self) -> bool {
        matches!(self, Guarded::Replayed(_))
    }
}

/// Exactly-once wrapper around side effects, keyed by scope and identifying values.
#[derive(Clone)]
pub struct IdempotencyGuard {
    db: DbActorHandle,
    ttl: chrono::Duration,
}

impl IdempotencyGuard {
    pub fn new(db: DbActorHandle, ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(3650));
        Self { db, ttl }
    }

    pub async fn run<T, F, Fut>(
        &self,
        scope: &str,
        values: &[String],
        op: F,
    ) -> Result<Guarded<T>, ForgeError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ForgeError>>,
    {
        let key = idempotency_key(scope, values);

        match self.db.reserve_key(scope, &key, Utc::now(), self.ttl).await? {
            Reservation::Reserved => {}
            Reservation::Replayed(result) => {
                debug!(scope, key = %key, "replaying completed operation");
                let value = result.unwrap_or(Value::Null);
                return Ok(Guarded::Replayed(serde_json::from_value(value)?));
            }
            Reservation::InFlight => {
                return Err(ForgeError::DuplicateInFlight {
                    scope: scope.to_string(),
                });
            }
        }

        match op().await {
            Ok(out) => {
                self.db
                    .complete_key(&key, serde_json::to_value(&out)?)
                    .await?;
                Ok(Guarded::Fresh(out))
            }
            Err(e) => {
                if let Err(mark_err) = self.db.fail_key(&key, e.to_string()).await {
                    warn!(scope, key = %key, error = %mark_err, "failed to mark idempotency key failed");
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn key_is_sha256_of_joined_values() {
        let key = idempotency_key("wordpress.publish", ["p1", "a1", "i1"]);
        let expected = hex::encode(Sha256::digest(b"wordpress.publish:p1:a1:i1"));
        assert_eq!(key, expected);
        assert_eq!(key.len(), 64);
        assert_ne!(key, idempotency_key("wordpress.publish", ["p1", "a1", "i2"]));
    }

    #[test]
    fn decisions_follow_row_state() {
        let ttl = chrono::Duration::minutes(30);
        let now = at(3600);

        assert_eq!(decide(None, now, ttl), KeyDecision::Insert);
        assert_eq!(
            decide(Some((KeyStatus::Completed, at(0))), now, ttl),
            KeyDecision::Replay
        );
        assert_eq!(
            decide(Some((KeyStatus::Failed, at(3599))), now, ttl),
            KeyDecision::Reclaim
        );
        assert_eq!(
            decide(Some((KeyStatus::Reserved, at(3600 - 60))), now, ttl),
            KeyDecision::RejectInFlight
        );
        assert_eq!(
            decide(Some((KeyStatus::Reserved, at(3600 - 31 * 60))), now, ttl),
            KeyDecision::Reclaim
        );
    }

    #[test]
    fn reservation_expires_exactly_at_ttl() {
        let ttl = chrono::Duration::minutes(30);
        let created = at(0);
        assert_eq!(
            decide(Some((KeyStatus::Reserved, created)), at(30 * 60), ttl),
            KeyDecision::Reclaim
        );
        assert_eq!(
            decide(Some((KeyStatus::Reserved, created)), at(30 * 60 - 1), ttl),
            KeyDecision::RejectInFlight
        );
    }
}
