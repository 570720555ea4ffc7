mod support;

use chrono::{Duration as TimeDelta, Utc};
use serde_json::json;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;
use wpforge::ForgeError;
use wpforge::db::{self, KeyStatus, Reservation};
use wpforge::pipeline::{Guarded, IdempotencyGuard, idempotency_key};

#[tokio::test]
async fn reservations_follow_key_lifecycle() {
    let (database_url, path) = support::temp_database("idem-lifecycle");
    let db = db::spawn(&database_url).await.expect("failed to spawn db");
    let ttl = TimeDelta::minutes(10);
    let now = Utc::now();
    let key = idempotency_key("wordpress.publish", ["post-1", "article-1", "none"]);

    // fresh key -> reserved, duplicate -> in flight
    let first = db
        .reserve_key("wordpress.publish", &key, now, ttl)
        .await
        .expect("reserve");
    assert_eq!(first, Reservation::Reserved);
    let dup = db
        .reserve_key("wordpress.publish", &key, now + TimeDelta::seconds(5), ttl)
        .await
        .expect("reserve dup");
    assert_eq!(dup, Reservation::InFlight);

    // completed -> replayed with the stored result
    db.complete_key(&key, json!({ "wp_post_id": 7 }))
        .await
        .expect("complete");
    let replay = db
        .reserve_key("wordpress.publish", &key, now + TimeDelta::seconds(6), ttl)
        .await
        .expect("reserve after completion");
    assert_eq!(replay, Reservation::Replayed(Some(json!({ "wp_post_id": 7 }))));

    let row = db
        .get_key(&key)
        .await
        .expect("get key")
        .expect("key row missing");
    assert_eq!(row.status, KeyStatus::Completed);
    assert_eq!(row.scope, "wordpress.publish");

    support::remove_database(&path).await;
}

#[tokio::test]
async fn stale_and_failed_reservations_are_reclaimed() {
    let (database_url, path) = support::temp_database("idem-reclaim");
    let db = db::spawn(&database_url).await.expect("failed to spawn db");
    let ttl = TimeDelta::minutes(10);

    // A reservation taken long ago by a worker that never finished.
    let stale_key = idempotency_key("openrouter.article", ["post-2", "article", "1"]);
    let long_ago = Utc::now() - TimeDelta::hours(1);
    assert_eq!(
        db.reserve_key("openrouter.article", &stale_key, long_ago, ttl)
            .await
            .expect("reserve stale"),
        Reservation::Reserved
    );
    assert_eq!(
        db.reserve_key("openrouter.article", &stale_key, Utc::now(), ttl)
            .await
            .expect("reclaim stale"),
        Reservation::Reserved
    );

    let failed_key = idempotency_key("openrouter.article", ["post-3", "article", "1"]);
    let now = Utc::now();
    db.reserve_key("openrouter.article", &failed_key, now, ttl)
        .await
        .expect("reserve");
    db.fail_key(&failed_key, "upstream timeout".to_string())
        .await
        .expect("fail key");
    let row = db
        .get_key(&failed_key)
        .await
        .expect("get key")
        .expect("key row missing");
    assert_eq!(row.status, KeyStatus::Failed);
    assert_eq!(row.error.as_deref(), Some("upstream timeout"));

    assert_eq!(
        db.reserve_key("openrouter.article", &failed_key, now, ttl)
            .await
            .expect("reclaim failed"),
        Reservation::Reserved
    );

    support::remove_database(&path).await;
}

#[tokio::test]
async fn guard_runs_once_and_retries_after_failure() {
    let (database_url, path) = support::temp_database("idem-guard");
    let db = db::spawn(&database_url).await.expect("failed to spawn db");
    let guard = IdempotencyGuard::new(db.clone(), Duration::from_secs(600));
    let calls = Arc::new(AtomicUsize::new(0));
    let values = ["post-9".to_string(), "article".to_string(), "1".to_string()];

    // A failure records the key as failed and surfaces the error.
    let err = guard
        .run("openrouter.article", &values, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<u32, _>(ForgeError::BadRequest("boom".to_string()))
            }
        })
        .await
        .expect_err("operation should fail");
    assert!(matches!(err, ForgeError::BadRequest(_)));

    // The retry runs the operation again and stores its result.
    let fresh = guard
        .run("openrouter.article", &values, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ForgeError>(42)
            }
        })
        .await
        .expect("retry failed");
    assert_eq!(fresh, Guarded::Fresh(42));

    // Later callers get the stored value without running anything.
    let replayed = guard
        .run("openrouter.article", &values, || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<u32, ForgeError>(0)
            }
        })
        .await
        .expect("replay failed");
    assert!(replayed.is_replayed());
    assert_eq!(replayed.into_inner(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let key = idempotency_key("openrouter.article", &values);
    let row = db.get_key(&key).await.expect("get key").expect("row missing");
    assert_eq!(row.status, KeyStatus::Completed);

    support::remove_database(&path).await;
}

#[tokio::test]
async fn concurrent_duplicate_is_rejected_while_in_flight() {
    let (database_url, path) = support::temp_database("idem-concurrent");
    let db = db::spawn(&database_url).await.expect("failed to spawn db");
    let guard = IdempotencyGuard::new(db.clone(), Duration::from_secs(600));
    let values = ["post-5".to_string()];

    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let slow_guard = guard.clone();
    let slow_values = values.clone();
    let slow = tokio::spawn(async move {
        slow_guard
            .run("wordpress.publish", &slow_values, || async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                Ok::<String, ForgeError>("done".to_string())
            })
            .await
    });

    started_rx.await.expect("slow operation never started");
    let dup = guard
        .run("wordpress.publish", &values, || async {
            Ok::<String, ForgeError>("duplicate".to_string())
        })
        .await;
    assert!(matches!(dup, Err(ForgeError::DuplicateInFlight { .. })));

    let _ = release_tx.send(());
    let first = slow
        .await
        .expect("slow task panicked")
        .expect("slow operation failed");
    assert_eq!(first, Guarded::Fresh("done".to_string()));

    support::remove_database(&path).await;
}
