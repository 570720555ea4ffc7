use serde::Serialize;
use std::time::Instant;
use tracing::info;

use crate::batch::BatchProcessor;
use crate::error::ForgeError;
use crate::pipeline::{PipelineRunner, Step};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Start a batch and fan out one `RunPipeline` per post.
    ProcessBatch { batch_id: String },
    RunPipeline {
        post_id: String,
        /// Set when the run counts towards a batch.
        batch_id: Option<String>,
    },
    Publish { post_id: String },
    Regenerate { post_id: String, step: Step },
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::ProcessBatch { .. } => "process_batch",
            Job::RunPipeline { .. } => "run_pipeline",
            Job::Publish { .. } => "publish",
            Job::Regenerate { .. } => "regenerate",
        }
    }

    /// Post the job works on; at most one such job runs per post.
    pub fn post_id(&self) -> Option<&str> {
        match self {
            Job::ProcessBatch { .. } => None,
            Job::RunPipeline { post_id, .. }
            | Job::Publish { post_id }
            | Job::Regenerate { post_id, .. } => Some(post_id),
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct QueuedJob {
    pub job: Job,
    /// 1-based.
    pub attempt: usize,
}

#[derive(Debug)]
pub(super) enum JobOutput {
    /// Post ids of a started batch.
    Batch(Vec<String>),
    Done,
}

#[derive(Debug)]
pub(super) struct JobOutcome {
    pub queued: QueuedJob,
    pub result: Result<JobOutput, ForgeError>,
}

#[derive(Clone)]
pub(super) struct JobExecutor {
    pub runner: PipelineRunner,
    pub batches: BatchProcessor,
}

impl JobExecutor {
    pub async fn execute(&self, queued: QueuedJob) -> JobOutcome {
        let start = Instant::now();
        let result = match &queued.job {
            Job::ProcessBatch { batch_id } => {
                self.batches.start(batch_id).await.map(JobOutput::Batch)
            }
            Job::RunPipeline { post_id, .. } => {
                self.runner.run(post_id).await.map(|_| JobOutput::Done)
            }
            Job::Publish { post_id } => self.runner.publish(post_id).await.map(|_| JobOutput::Done),
            Job::Regenerate { post_id, step } => self
                .runner
                .regenerate(post_id, *step)
                .await
                .map(|_| JobOutput::Done),
        };

        info!(
            job = queued.job.name(),
            post_id = queued.job.post_id().unwrap_or("-"),
            attempt = queued.attempt,
            ok = result.is_ok(),
            took_ms = start.elapsed().as_millis() as u64,
            "job executed"
        );
        JobOutcome { queued, result }
    }
}
