//! Persistent storage behind a single actor.
//!
//! Layout:
//! - `models.rs`: row structs and status enums
//! - `patch.rs`: inputs for creates and partial updates
//! - `schema.rs`: SQLite DDL applied at startup
//! - `store/`: the SQL, one file per table group
//! - `actor.rs`: the `DbActor` that owns the pool and its handle

pub mod actor;
pub mod models;
pub mod patch;
pub mod schema;

mod store;

pub use actor::{DbActorHandle, spawn};
pub use models::{
    ArtifactBlob, BatchStatus, DbAgency, DbBatchJob, DbEditorialPlan, DbEditorialPlanItem,
    DbIdempotencyKey, DbPost, DbPostArtifact, DbProject, ErrorEntry, KeyStatus, PlanItemStatus,
    PostStatus, ProjectSettings, Reservation,
};
pub use patch::{
    AgencyCreate, ArtifactCreate, BatchCreate, BatchCreated, BatchItemOutcome, PlannedPost,
    PostPatch, ProjectCreate,
};
pub use schema::SQLITE_INIT;
