mod support;

use chrono::Utc;
use serde_json::json;
use support::{
    ARTICLE_MODEL, FIRST_TITLE, Harness, Hits, MEDIA_ID, REGENERATED_TITLE, RESEARCH_MODEL,
    WP_POST_ID,
};
use wpforge::ForgeError;
use wpforge::db::{PlanItemStatus, PostStatus, ProjectSettings, Reservation};
use wpforge::pipeline::{Step, idempotency_key};

fn settings() -> ProjectSettings {
    ProjectSettings {
        word_count: 800,
        wp_status: "draft".to_string(),
        ..ProjectSettings::default()
    }
}

#[tokio::test]
async fn post_runs_publishes_once_and_regenerates_new_versions() {
    let h = Harness::new("e2e", settings()).await;
    let hits = h.mock.hits.clone();

    let submission = h
        .batches
        .submit_keywords(&h.project, &["async rust".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let post_id = submission.created.posts[0].id.clone();

    // 1) full generation run
    let post = h.runner.run(&post_id).await.expect("pipeline run failed");
    assert_eq!(post.status, PostStatus::Ready);
    // The generated title lives on the strategy artifact, not on the post.
    assert_eq!(post.title, None);
    assert_eq!(post.tokens_in, 300);
    assert_eq!(post.tokens_out, 150);
    assert!(post.cost_usd > 0.0);
    assert_eq!(Hits::get(&hits.chat), 3);
    assert_eq!(Hits::get(&hits.images), 1);

    let artifacts = h.db.list_artifacts(&post_id).await.expect("list artifacts");
    assert_eq!(artifacts.len(), 4);
    assert!(artifacts.iter().all(|a| a.is_active && a.version == 1));

    // A second run finds every step done and calls nothing.
    h.runner.run(&post_id).await.expect("second run failed");
    assert_eq!(Hits::get(&hits.chat), 3);

    // 2) publish
    let receipt = h.runner.publish(&post_id).await.expect("publish failed");
    assert_eq!(receipt.wp_post_id, WP_POST_ID);
    assert_eq!(receipt.media_id, Some(MEDIA_ID));
    assert_eq!(receipt.status.as_deref(), Some("draft"));
    assert_eq!(receipt.title, FIRST_TITLE);
    assert_eq!(hits.last_title().as_deref(), Some(FIRST_TITLE));
    assert_eq!(Hits::get(&hits.post_creates), 1);
    assert_eq!(Hits::get(&hits.media), 1);
    assert_eq!(Hits::get(&hits.notifications), 1);
    // The upload reuses the stored picture.
    assert_eq!(Hits::get(&hits.images), 1);

    let post = h.db.get_post(&post_id).await.expect("get post");
    assert_eq!(post.status, PostStatus::Published);
    assert_eq!(post.wp_post_id, Some(WP_POST_ID as i64));

    let (_, items) = h
        .db
        .get_plan(&submission.created.plan.id)
        .await
        .expect("get plan");
    assert_eq!(items[0].status, PlanItemStatus::Published);

    // 3) publishing the same artifacts again replays the stored receipt
    let again = h.runner.publish(&post_id).await.expect("replayed publish failed");
    assert_eq!(again, receipt);
    assert_eq!(Hits::get(&hits.post_creates), 1);
    assert_eq!(Hits::get(&hits.media), 1);
    assert_eq!(Hits::get(&hits.notifications), 1);

    // 4) regenerating the article also redoes the image
    let post = h
        .runner
        .regenerate(&post_id, Step::Article)
        .await
        .expect("regenerate failed");
    assert_eq!(post.status, PostStatus::Ready);
    assert_eq!(Hits::get(&hits.chat), 4);
    assert_eq!(Hits::get(&hits.images), 2);

    let artifacts = h.db.list_artifacts(&post_id).await.expect("list artifacts");
    let articles: Vec<_> = artifacts.iter().filter(|a| a.step == Step::Article).collect();
    assert_eq!(articles.len(), 2);
    assert_eq!(articles.iter().filter(|a| a.is_active).count(), 1);
    let active = articles
        .iter()
        .find(|a| a.is_active)
        .expect("no active article");
    assert_eq!(active.version, 2);
    assert_eq!(active.model.as_deref(), Some(ARTICLE_MODEL));

    let research: Vec<_> = artifacts.iter().filter(|a| a.step == Step::Research).collect();
    assert_eq!(research.len(), 1);

    // 5) the new artifact set updates the existing WordPress post
    let receipt = h.runner.publish(&post_id).await.expect("republish failed");
    assert_eq!(receipt.wp_post_id, WP_POST_ID);
    assert_eq!(Hits::get(&hits.post_creates), 1);
    assert_eq!(Hits::get(&hits.post_updates), 1);
    assert_eq!(Hits::get(&hits.media), 2);
    assert_eq!(Hits::get(&hits.images), 2);
    assert_eq!(receipt.title, FIRST_TITLE);

    // 6) a regenerated strategy brings its new title to WordPress
    h.runner
        .regenerate(&post_id, Step::Strategy)
        .await
        .expect("strategy regenerate failed");
    assert_eq!(Hits::get(&hits.chat), 6);
    let receipt = h.runner.publish(&post_id).await.expect("retitled publish failed");
    assert_eq!(receipt.title, REGENERATED_TITLE);
    assert_eq!(hits.last_title().as_deref(), Some(REGENERATED_TITLE));
    assert_eq!(Hits::get(&hits.post_updates), 2);
    assert_eq!(Hits::get(&hits.images), 3);

    // 7) delete removes the WordPress post with force=true
    let remote_deleted = h
        .runner
        .delete_post(&post_id, true)
        .await
        .expect("delete failed");
    assert!(remote_deleted);
    assert_eq!(Hits::get(&hits.deletes), 1);
    let queries = hits.delete_queries.lock().expect("poisoned").clone();
    assert_eq!(queries, vec!["force=true".to_string()]);

    let gone = h.db.get_post(&post_id).await;
    assert!(matches!(gone, Err(ForgeError::NotFound { .. })));

    h.cleanup().await;
}

#[tokio::test]
async fn disabled_images_publish_without_media() {
    let h = Harness::new(
        "no-images",
        ProjectSettings {
            generate_images: false,
            auto_publish: true,
            ..settings()
        },
    )
    .await;
    let hits = h.mock.hits.clone();

    let submission = h
        .batches
        .submit_keywords(&h.project, &["sqlite wal mode".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let post_id = submission.created.posts[0].id.clone();

    let post = h.runner.run(&post_id).await.expect("pipeline run failed");
    assert_eq!(post.status, PostStatus::Published);
    assert_eq!(Hits::get(&hits.images), 0);
    assert_eq!(Hits::get(&hits.media), 0);
    assert_eq!(Hits::get(&hits.post_creates), 1);

    let image = h
        .db
        .active_artifact(&post_id, Step::Image)
        .await
        .expect("active artifact")
        .expect("image placeholder missing");
    assert_eq!(image.content.0["skipped"], true);

    h.cleanup().await;
}

#[tokio::test]
async fn budget_overrun_fails_the_post_before_any_call() {
    let h = Harness::new(
        "budget",
        ProjectSettings {
            max_cost_per_post_usd: Some(0.0000001),
            ..settings()
        },
    )
    .await;
    let hits = h.mock.hits.clone();

    let submission = h
        .batches
        .submit_keywords(&h.project, &["cost control".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let post_id = submission.created.posts[0].id.clone();

    let err = h.runner.run(&post_id).await.expect_err("budget should be exceeded");
    assert!(matches!(err, ForgeError::BudgetExceeded { .. }));
    assert_eq!(Hits::get(&hits.chat), 0);

    let post = h.db.get_post(&post_id).await.expect("get post");
    assert_eq!(post.status, PostStatus::Failed);
    assert_eq!(post.error_log.0.len(), 1);
    assert_eq!(post.error_log.0[0].step, None);

    h.cleanup().await;
}

#[tokio::test]
async fn sheet_title_wins_over_generated_one() {
    let h = Harness::new("sheet-title", settings()).await;
    let hits = h.mock.hits.clone();

    let submission = h
        .batches
        .submit_csv(
            &h.project,
            "plan.csv",
            b"keyword,title\nasync rust,Our Own Async Headline\n",
            None,
        )
        .await
        .expect("failed to submit sheet");
    let post_id = submission.created.posts[0].id.clone();

    h.runner.run(&post_id).await.expect("pipeline run failed");
    let receipt = h.runner.publish(&post_id).await.expect("publish failed");
    assert_eq!(receipt.title, "Our Own Async Headline");
    assert_eq!(hits.last_title().as_deref(), Some("Our Own Async Headline"));

    let post = h.db.get_post(&post_id).await.expect("get post");
    assert_eq!(post.title.as_deref(), Some("Our Own Async Headline"));

    h.cleanup().await;
}

#[tokio::test]
async fn timed_out_create_is_not_sent_twice() {
    let h = Harness::with_config("wp-timeout", settings(), |cfg| {
        cfg.providers.wordpress.timeout_secs = 1;
        cfg.providers.wordpress.retry_max_times = Some(2);
    })
    .await;
    let hits = h.mock.hits.clone();

    let submission = h
        .batches
        .submit_keywords(&h.project, &["slow wordpress".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let post_id = submission.created.posts[0].id.clone();
    h.runner.run(&post_id).await.expect("pipeline run failed");

    // WordPress stores the post but answers after the client gave up.
    hits.create_delay_ms.store(1_500, std::sync::atomic::Ordering::SeqCst);
    let err = h.runner.publish(&post_id).await.expect_err("publish should time out");
    assert!(matches!(err, ForgeError::ReqwestError(_)), "got {err:?}");
    assert_eq!(Hits::get(&hits.post_creates), 1);
    assert_eq!(Hits::get(&hits.media), 1);

    let post = h.db.get_post(&post_id).await.expect("get post");
    assert_eq!(post.status, PostStatus::Failed);
    assert_eq!(post.error_log.0.last().and_then(|e| e.step), Some(Step::Publish));

    h.cleanup().await;
}

#[tokio::test]
async fn duplicate_in_flight_leaves_the_post_as_it_was() {
    let h = Harness::new("in-flight", settings()).await;
    let hits = h.mock.hits.clone();

    let submission = h
        .batches
        .submit_keywords(&h.project, &["busy keyword".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let post_id = submission.created.posts[0].id.clone();

    // Another worker holds the research reservation.
    let scope = "openrouter.research";
    let key = idempotency_key(scope, [post_id.as_str(), "research", "1"]);
    let reservation = h
        .db
        .reserve_key(scope, &key, Utc::now(), chrono::Duration::minutes(30))
        .await
        .expect("reserve key");
    assert_eq!(reservation, Reservation::Reserved);

    let err = h.runner.run(&post_id).await.expect_err("run should be rejected");
    assert!(matches!(err, ForgeError::DuplicateInFlight { .. }), "got {err:?}");
    assert_eq!(Hits::get(&hits.chat), 0);

    let post = h.db.get_post(&post_id).await.expect("get post");
    assert_eq!(post.status, PostStatus::Pending);
    assert!(post.error_log.0.is_empty());

    h.cleanup().await;
}

#[tokio::test]
async fn paid_completion_is_reused_after_a_crash() {
    let h = Harness::new("paid-replay", settings()).await;
    let hits = h.mock.hits.clone();

    let submission = h
        .batches
        .submit_keywords(&h.project, &["crash recovery".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let post_id = submission.created.posts[0].id.clone();

    // The research call was billed and stored, but the artifact never got written.
    let scope = "openrouter.research";
    let key = idempotency_key(scope, [post_id.as_str(), "research", "1"]);
    h.db.reserve_key(scope, &key, Utc::now(), chrono::Duration::minutes(30))
        .await
        .expect("reserve key");
    h.db.complete_key(
        &key,
        json!({
            "completion": {
                "content": "{}",
                "model": RESEARCH_MODEL,
                "tokens_in": 700,
                "tokens_out": 70
            },
            "content": {
                "summary": "Recovered research.",
                "key_points": ["kept"],
                "questions": [],
                "sources": []
            }
        }),
    )
    .await
    .expect("complete key");

    let post = h.runner.run(&post_id).await.expect("pipeline run failed");
    assert_eq!(post.status, PostStatus::Ready);
    // Strategy and article only.
    assert_eq!(Hits::get(&hits.chat), 2);

    let research = h
        .db
        .active_artifact(&post_id, Step::Research)
        .await
        .expect("active artifact")
        .expect("research artifact missing");
    assert_eq!(research.tokens_in, 700);
    assert_eq!(research.content.0["summary"], "Recovered research.");

    h.cleanup().await;
}

#[tokio::test]
async fn failed_notification_is_logged_without_failing_the_publish() {
    let h = Harness::new("notify-fail", settings()).await;
    let hits = h.mock.hits.clone();
    hits.fail_notifications
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let submission = h
        .batches
        .submit_keywords(&h.project, &["quiet phone".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let post_id = submission.created.posts[0].id.clone();

    h.runner.run(&post_id).await.expect("pipeline run failed");
    h.runner.publish(&post_id).await.expect("publish failed");
    assert_eq!(Hits::get(&hits.notifications), 1);

    let post = h.db.get_post(&post_id).await.expect("get post");
    assert_eq!(post.status, PostStatus::Published);
    let entry = post.error_log.0.last().expect("notification error missing");
    assert_eq!(entry.code, "NOTIFY_FAILED");
    assert_eq!(entry.step, Some(Step::Publish));

    h.cleanup().await;
}
