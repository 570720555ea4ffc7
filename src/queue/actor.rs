use ahash::AHashSet;
use backon::{BackoffBuilder, ExponentialBuilder};
use futures::stream::StreamExt;
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::job::{Job, JobExecutor, JobOutcome, JobOutput, QueuedJob};
use crate::batch::BatchProcessor;
use crate::config::PipelineConfig;
use crate::db::{BatchItemOutcome, DbActorHandle};
use crate::error::{ForgeError, IsRetryable};
use crate::pipeline::PipelineRunner;

/// Delay before re-dispatching a job whose post is busy.
const POST_BUSY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub running: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retried: u64,
}

#[derive(Debug)]
enum JobQueueMessage {
    Enqueue(Job),
    Dispatch(QueuedJob),
    Completed(JobOutcome),
    Stats(RpcReplyPort<QueueStats>),
}

#[derive(Clone)]
pub struct JobQueueHandle {
    actor: ActorRef<JobQueueMessage>,
}

impl JobQueueHandle {
    pub fn enqueue(&self, job: Job) -> Result<(), ForgeError> {
        ractor::cast!(self.actor, JobQueueMessage::Enqueue(job))
            .map_err(|e| ForgeError::RactorError(format!("JobQueue cast failed: {e}")))
    }

    pub async fn stats(&self) -> Result<QueueStats, ForgeError> {
        ractor::call!(self.actor, JobQueueMessage::Stats)
            .map_err(|e| ForgeError::RactorError(format!("JobQueue Stats RPC failed: {e}")))
    }
}

struct JobQueueState {
    job_tx: mpsc::Sender<QueuedJob>,
    db: DbActorHandle,
    busy_posts: AHashSet<String>,
    retry_policy: ExponentialBuilder,
    max_attempts: usize,
    stats: QueueStats,
}

struct JobQueueArgs {
    db: DbActorHandle,
    executor: JobExecutor,
    cfg: PipelineConfig,
}

struct JobQueueActor;

#[ractor::async_trait]
impl Actor for JobQueueActor {
    type Msg = JobQueueMessage;
    type State = JobQueueState;
    type Arguments = JobQueueArgs;

    async fn pre_start(
        &self,
        myself: ActorRef<Self::Msg>,
        JobQueueArgs { db, executor, cfg }: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let (job_tx, job_rx) = mpsc::channel::<QueuedJob>(cfg.queue_capacity.max(1));
        let concurrency = cfg.worker_concurrency.max(1);

        tokio::spawn({
            let myself = myself.clone();
            async move {
                info!("Job Pipeline Started: BufferUnordered={}", concurrency);

                let mut pipeline = ReceiverStream::new(job_rx)
                    .map(|queued| {
                        let executor = executor.clone();
                        async move { executor.execute(queued).await }
                    })
                    .buffer_unordered(concurrency);

                while let Some(outcome) = pipeline.next().await {
                    if let Err(e) = myself.cast(JobQueueMessage::Completed(outcome)) {
                        warn!("JobQueue unreachable (channel closed), worker stopping: {}", e);
                        break;
                    }
                }

                info!("Job Pipeline Stopped");
            }
        });

        let retry_policy = ExponentialBuilder::default()
            .with_min_delay(cfg.retry_min_delay())
            .with_max_delay(cfg.retry_max_delay())
            .with_max_times(cfg.max_attempts)
            .with_jitter();

        info!(
            worker_concurrency = concurrency,
            queue_capacity = cfg.queue_capacity,
            max_attempts = cfg.max_attempts,
            "JobQueue initialized"
        );

        Ok(JobQueueState {
            job_tx,
            db,
            busy_posts: AHashSet::new(),
            retry_policy,
            max_attempts: cfg.max_attempts.max(1),
            stats: QueueStats::default(),
        })
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            JobQueueMessage::Enqueue(job) => {
                state.stats.enqueued += 1;
                debug!(job = job.name(), post_id = job.post_id().unwrap_or("-"), "job enqueued");
                self.dispatch(myself, state, QueuedJob { job, attempt: 1 });
            }
            JobQueueMessage::Dispatch(queued) => self.dispatch(myself, state, queued),
            JobQueueMessage::Completed(outcome) => self.complete(myself, state, outcome),
            JobQueueMessage::Stats(reply) => {
                let _ = reply.send(state.stats);
            }
        }
        Ok(())
    }
}

impl JobQueueActor {
    fn dispatch(
        &self,
        myself: ActorRef<JobQueueMessage>,
        state: &mut JobQueueState,
        queued: QueuedJob,
    ) {
        if let Some(post_id) = queued.job.post_id() {
            if !state.busy_posts.insert(post_id.to_string()) {
                debug!(job = queued.job.name(), post_id, "post busy, re-dispatching later");
                dispatch_later(myself, POST_BUSY_DELAY, queued);
                return;
            }
        }
        state.stats.running += 1;

        let tx = state.job_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tx.send(queued).await {
                warn!("Failed to submit job (channel closed): {}", e);
                let outcome = JobOutcome {
                    queued: e.0,
                    result: Err(ForgeError::RactorError("job channel is closed".to_string())),
                };
                if let Err(e) = myself.cast(JobQueueMessage::Completed(outcome)) {
                    warn!("JobQueue unreachable, dropping job outcome: {}", e);
                }
            }
        });
    }

    fn complete(
        &self,
        myself: ActorRef<JobQueueMessage>,
        state: &mut JobQueueState,
        outcome: JobOutcome,
    ) {
        let JobOutcome { queued, result } = outcome;
        if let Some(post_id) = queued.job.post_id() {
            state.busy_posts.remove(post_id);
        }
        state.stats.running = state.stats.running.saturating_sub(1);

        match result {
            Ok(output) => {
                state.stats.succeeded += 1;
                if let (JobOutput::Batch(post_ids), Job::ProcessBatch { batch_id }) =
                    (output, &queued.job)
                {
                    for post_id in post_ids {
                        let job = Job::RunPipeline {
                            post_id,
                            batch_id: Some(batch_id.clone()),
                        };
                        state.stats.enqueued += 1;
                        self.dispatch(myself.clone(), state, QueuedJob { job, attempt: 1 });
                    }
                    return;
                }
                record_final(state.db.clone(), queued.job, BatchItemOutcome::Processed, None);
            }

            Err(e) if e.is_retryable() && queued.attempt < state.max_attempts => {
                state.stats.retried += 1;
                let delay = state
                    .retry_policy
                    .build()
                    .nth(queued.attempt - 1)
                    .unwrap_or(Duration::from_secs(1));
                warn!(
                    job = queued.job.name(),
                    post_id = queued.job.post_id().unwrap_or("-"),
                    attempt = queued.attempt,
                    error = %e,
                    ?delay,
                    "job failed, retrying"
                );
                let next = QueuedJob {
                    job: queued.job,
                    attempt: queued.attempt + 1,
                };
                dispatch_later(myself, delay, next);
            }

            Err(e) => {
                state.stats.failed += 1;
                error!(
                    job = queued.job.name(),
                    post_id = queued.job.post_id().unwrap_or("-"),
                    attempt = queued.attempt,
                    code = e.code(),
                    error = %e,
                    "job failed permanently"
                );
                record_final(
                    state.db.clone(),
                    queued.job,
                    BatchItemOutcome::Failed,
                    Some(e.to_string()),
                );
            }
        }
    }
}

fn dispatch_later(myself: ActorRef<JobQueueMessage>, delay: Duration, queued: QueuedJob) {
    tokio::spawn(async move {
        sleep(delay).await;
        if let Err(e) = myself.cast(JobQueueMessage::Dispatch(queued)) {
            warn!("JobQueue unreachable, dropping delayed job: {}", e);
        }
    });
}

/// Books the final result of batch-related jobs on the batch row.
fn record_final(db: DbActorHandle, job: Job, outcome: BatchItemOutcome, error: Option<String>) {
    tokio::spawn(async move {
        let res = match job {
            Job::RunPipeline {
                post_id,
                batch_id: Some(batch_id),
            } => db
                .record_batch_item(&batch_id, &post_id, outcome)
                .await
                .map(|batch| {
                    debug!(
                        batch_id = %batch.id,
                        processed = batch.processed,
                        failed = batch.failed,
                        total = batch.total,
                        "batch progress"
                    );
                }),
            Job::ProcessBatch { batch_id } => match error {
                Some(error) => db.fail_batch(&batch_id, error).await,
                None => Ok(()),
            },
            _ => Ok(()),
        };
        if let Err(e) = res {
            warn!(error = %e, "failed to record job outcome");
        }
    });
}

/// Spawns the queue actor and its worker pipeline.
pub async fn spawn(
    db: DbActorHandle,
    runner: PipelineRunner,
    batches: BatchProcessor,
    cfg: PipelineConfig,
) -> Result<JobQueueHandle, ForgeError> {
    let args = JobQueueArgs {
        db,
        executor: JobExecutor { runner, batches },
        cfg,
    };
    let (actor, _jh) = Actor::spawn(None, JobQueueActor, args)
        .await
        .map_err(|e| ForgeError::RactorError(format!("failed to spawn JobQueue: {e}")))?;
    Ok(JobQueueHandle { actor })
}
