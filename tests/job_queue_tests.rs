mod support;

use std::sync::atomic::Ordering;
use std::time::Duration;
use support::{Harness, Hits};
use wpforge::db::{BatchStatus, DbActorHandle, DbBatchJob, PostStatus, ProjectSettings};
use wpforge::queue::{self, Job, JobQueueHandle, QueueStats};

async fn harness(tag: &str) -> Harness {
    Harness::with_config(tag, ProjectSettings::default(), |cfg| {
        cfg.pipeline.max_attempts = 3;
        cfg.pipeline.retry_min_delay_ms = 10;
        cfg.pipeline.retry_max_delay_ms = 20;
    })
    .await
}

async fn start_queue(h: &Harness) -> JobQueueHandle {
    queue::spawn(
        h.db.clone(),
        h.runner.clone(),
        h.batches.clone(),
        h.cfg.pipeline.clone(),
    )
    .await
    .expect("failed to spawn job queue")
}

async fn wait_for_batch(db: &DbActorHandle, batch_id: &str) -> DbBatchJob {
    for _ in 0..200 {
        let batch = db.get_batch(batch_id).await.expect("get batch");
        if matches!(batch.status, BatchStatus::Completed | BatchStatus::Failed) {
            return batch;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("batch {batch_id} never finished");
}

async fn wait_for_stats(jobs: &JobQueueHandle, done: impl Fn(&QueueStats) -> bool) -> QueueStats {
    for _ in 0..200 {
        let stats = jobs.stats().await.expect("queue stats");
        if done(&stats) {
            return stats;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("queue never settled");
}

#[tokio::test]
async fn transient_failure_is_retried_and_booked_once() {
    let h = harness("queue-retry").await;
    let hits = h.mock.hits.clone();
    hits.chat_failures.store(1, Ordering::SeqCst);
    let jobs = start_queue(&h).await;

    let submission = h
        .batches
        .submit_keywords(&h.project, &["flaky upstream".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let batch_id = submission.created.batch.id.clone();
    let post_id = submission.created.posts[0].id.clone();

    jobs.enqueue(Job::ProcessBatch {
        batch_id: batch_id.clone(),
    })
    .expect("enqueue batch");

    let batch = wait_for_batch(&h.db, &batch_id).await;
    assert_eq!(batch.status, BatchStatus::Completed);
    assert_eq!(batch.processed, 1);
    assert_eq!(batch.failed, 0);

    let stats = wait_for_stats(&jobs, |s| s.running == 0).await;
    assert_eq!(stats.retried, 1);
    assert_eq!(stats.failed, 0);
    // The batch job and the post run.
    assert_eq!(stats.succeeded, 2);
    assert_eq!(Hits::get(&hits.chat), 4);

    let post = h.db.get_post(&post_id).await.expect("get post");
    assert_eq!(post.status, PostStatus::Ready);
    // The failed first attempt stays in the history.
    assert_eq!(post.error_log.0.len(), 1);

    h.cleanup().await;
}

#[tokio::test]
async fn exhausted_retries_fail_the_item_once() {
    let h = harness("queue-exhausted").await;
    let hits = h.mock.hits.clone();
    hits.chat_failures.store(usize::MAX, Ordering::SeqCst);
    let jobs = start_queue(&h).await;

    let submission = h
        .batches
        .submit_keywords(&h.project, &["always down".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let batch_id = submission.created.batch.id.clone();
    let post_id = submission.created.posts[0].id.clone();

    jobs.enqueue(Job::ProcessBatch {
        batch_id: batch_id.clone(),
    })
    .expect("enqueue batch");

    let batch = wait_for_batch(&h.db, &batch_id).await;
    assert_eq!(batch.status, BatchStatus::Failed);
    assert_eq!(batch.processed, 0);
    assert_eq!(batch.failed, 1);

    let stats = wait_for_stats(&jobs, |s| s.running == 0).await;
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.failed, 1);
    assert_eq!(Hits::get(&hits.chat), 3);

    let post = h.db.get_post(&post_id).await.expect("get post");
    assert_eq!(post.status, PostStatus::Failed);
    assert_eq!(post.error_log.0.len(), 3);

    h.cleanup().await;
}

#[tokio::test]
async fn jobs_for_the_same_post_run_one_at_a_time() {
    let h = harness("queue-busy").await;
    let hits = h.mock.hits.clone();
    hits.chat_delay_ms.store(50, Ordering::SeqCst);
    let jobs = start_queue(&h).await;

    let submission = h
        .batches
        .submit_keywords(&h.project, &["one post".to_string()], None, None)
        .await
        .expect("failed to submit keywords");
    let post_id = submission.created.posts[0].id.clone();

    for _ in 0..2 {
        jobs.enqueue(Job::RunPipeline {
            post_id: post_id.clone(),
            batch_id: None,
        })
        .expect("enqueue run");
    }

    let stats = wait_for_stats(&jobs, |s| s.succeeded + s.failed == 2).await;
    assert_eq!(stats.succeeded, 2);
    // The second run waited for the first instead of colliding with it.
    assert_eq!(stats.retried, 0);
    assert_eq!(Hits::get(&hits.chat), 3);

    let post = h.db.get_post(&post_id).await.expect("get post");
    assert_eq!(post.status, PostStatus::Ready);
    assert!(post.error_log.0.is_empty());

    h.cleanup().await;
}
