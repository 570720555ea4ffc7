//! Background job queue: a ractor actor in front of a bounded worker pipeline.

mod actor;
mod job;

pub use actor::{JobQueueHandle, QueueStats, spawn};
pub use job::Job;
