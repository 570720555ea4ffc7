//! The content-generation pipeline: steps, cost arithmetic, the idempotency guard and the
//! runner that ties them to the upstream clients.

pub mod cost;
pub mod idempotency;
pub mod prompts;
pub mod runner;
mod step;

pub use cost::{BatchEstimate, CostEstimator, PostEstimate, StepEstimate};
pub use idempotency::{Guarded, IdempotencyGuard, KeyDecision, decide, idempotency_key};
pub use runner::{BulkDeleteOutcome, PipelineRunner, PublishReceipt};
pub use step::Step;
