use std::{str::FromStr, time::Duration};

use chrono::{DateTime, Utc};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tracing::info;

use crate::db::models::{
    ArtifactBlob, DbAgency, DbBatchJob, DbEditorialPlan, DbEditorialPlanItem, DbIdempotencyKey,
    DbPost, DbPostArtifact, DbProject, ErrorEntry, PlanItemStatus, Reservation,
};
use crate::db::patch::{
    AgencyCreate, ArtifactCreate, BatchCreate, BatchCreated, BatchItemOutcome, PostPatch,
    ProjectCreate,
};
use crate::db::schema::SQLITE_INIT;
use crate::db::store::{artifacts, idempotency, plans, posts, projects};
use crate::error::ForgeError;
use crate::pipeline::Step;

type Reply<T> = RpcReplyPort<Result<T, ForgeError>>;

#[derive(Debug)]
pub enum DbActorMessage {
    CreateAgency(AgencyCreate, Reply<DbAgency>),
    CreateProject(ProjectCreate, Reply<DbProject>),
    GetProject(String, Reply<DbProject>),
    /// Project owning a license key, if any.
    FindProjectByLicense(String, Reply<Option<DbProject>>),

    /// Batch job, editorial plan, posts and plan items in one transaction.
    CreateBatch(BatchCreate, Reply<BatchCreated>),
    GetBatch(String, Reply<DbBatchJob>),
    MarkBatchRunning(String, Reply<DbBatchJob>),
    FailBatch(String, String, Reply<()>),
    RecordBatchItem(String, String, BatchItemOutcome, Reply<DbBatchJob>),

    GetPost(String, Reply<DbPost>),
    ListBatchPosts(String, Reply<Vec<DbPost>>),
    PatchPost(String, PostPatch, Reply<()>),
    AppendPostError(String, ErrorEntry, Reply<()>),
    DeletePost(String, Reply<bool>),

    InsertArtifact(ArtifactCreate, Reply<DbPostArtifact>),
    ActiveArtifact(String, Step, Reply<Option<DbPostArtifact>>),
    ListArtifacts(String, Reply<Vec<DbPostArtifact>>),
    GetArtifactBlob(String, Reply<Option<ArtifactBlob>>),
    NextArtifactVersion(String, Step, Reply<i64>),
    ActivateArtifact(String, String, Reply<DbPostArtifact>),

    ListPlans(String, i64, Reply<Vec<DbEditorialPlan>>),
    GetPlan(String, Reply<(DbEditorialPlan, Vec<DbEditorialPlanItem>)>),
    SetPlanItemStatus(String, PlanItemStatus, Reply<()>),

    /// Reserve `(scope, key_hash)` as of `now` with a stale-reservation TTL.
    ReserveKey(String, String, DateTime<Utc>, chrono::Duration, Reply<Reservation>),
    CompleteKey(String, Value, Reply<()>),
    FailKey(String, String, Reply<()>),
    GetKey(String, Reply<Option<DbIdempotencyKey>>),
}

#[derive(Clone)]
pub struct DbActorHandle {
    actor: ActorRef<DbActorMessage>,
}

fn rpc_error(op: &str, e: impl std::fmt::Display) -> ForgeError {
    ForgeError::RactorError(format!("DbActor {op} RPC failed: {e}"))
}

impl DbActorHandle {
    pub async fn create_agency(&self, create: AgencyCreate) -> Result<DbAgency, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::CreateAgency, create)
            .map_err(|e| rpc_error("CreateAgency", e))?
    }

    pub async fn create_project(&self, create: ProjectCreate) -> Result<DbProject, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::CreateProject, create)
            .map_err(|e| rpc_error("CreateProject", e))?
    }

    pub async fn get_project(&self, id: &str) -> Result<DbProject, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::GetProject, id.to_string())
            .map_err(|e| rpc_error("GetProject", e))?
    }

    pub async fn find_project_by_license(
        &self,
        license_key: &str,
    ) -> Result<Option<DbProject>, ForgeError> {
        ractor::call!(
            self.actor,
            DbActorMessage::FindProjectByLicense,
            license_key.to_string()
        )
        .map_err(|e| rpc_error("FindProjectByLicense", e))?
    }

    pub async fn create_batch(&self, create: BatchCreate) -> Result<BatchCreated, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::CreateBatch, create)
            .map_err(|e| rpc_error("CreateBatch", e))?
    }

    pub async fn get_batch(&self, id: &str) -> Result<DbBatchJob, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::GetBatch, id.to_string())
            .map_err(|e| rpc_error("GetBatch", e))?
    }

    pub async fn mark_batch_running(&self, id: &str) -> Result<DbBatchJob, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::MarkBatchRunning, id.to_string())
            .map_err(|e| rpc_error("MarkBatchRunning", e))?
    }

    pub async fn fail_batch(&self, id: &str, error: String) -> Result<(), ForgeError> {
        ractor::call!(self.actor, DbActorMessage::FailBatch, id.to_string(), error)
            .map_err(|e| rpc_error("FailBatch", e))?
    }

    pub async fn record_batch_item(
        &self,
        batch_id: &str,
        post_id: &str,
        outcome: BatchItemOutcome,
    ) -> Result<DbBatchJob, ForgeError> {
        ractor::call!(
            self.actor,
            DbActorMessage::RecordBatchItem,
            batch_id.to_string(),
            post_id.to_string(),
            outcome
        )
        .map_err(|e| rpc_error("RecordBatchItem", e))?
    }

    pub async fn get_post(&self, id: &str) -> Result<DbPost, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::GetPost, id.to_string())
            .map_err(|e| rpc_error("GetPost", e))?
    }

    pub async fn list_batch_posts(&self, batch_id: &str) -> Result<Vec<DbPost>, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::ListBatchPosts, batch_id.to_string())
            .map_err(|e| rpc_error("ListBatchPosts", e))?
    }

    pub async fn patch_post(&self, id: &str, patch: PostPatch) -> Result<(), ForgeError> {
        ractor::call!(self.actor, DbActorMessage::PatchPost, id.to_string(), patch)
            .map_err(|e| rpc_error("PatchPost", e))?
    }

    pub async fn append_post_error(&self, id: &str, entry: ErrorEntry) -> Result<(), ForgeError> {
        ractor::call!(self.actor, DbActorMessage::AppendPostError, id.to_string(), entry)
            .map_err(|e| rpc_error("AppendPostError", e))?
    }

    pub async fn delete_post(&self, id: &str) -> Result<bool, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::DeletePost, id.to_string())
            .map_err(|e| rpc_error("DeletePost", e))?
    }

    pub async fn insert_artifact(
        &self,
        create: ArtifactCreate,
    ) -> Result<DbPostArtifact, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::InsertArtifact, create)
            .map_err(|e| rpc_error("InsertArtifact", e))?
    }

    pub async fn active_artifact(
        &self,
        post_id: &str,
        step: Step,
    ) -> Result<Option<DbPostArtifact>, ForgeError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ActiveArtifact,
            post_id.to_string(),
            step
        )
        .map_err(|e| rpc_error("ActiveArtifact", e))?
    }

    pub async fn list_artifacts(&self, post_id: &str) -> Result<Vec<DbPostArtifact>, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::ListArtifacts, post_id.to_string())
            .map_err(|e| rpc_error("ListArtifacts", e))?
    }

    pub async fn artifact_blob(&self, artifact_id: &str) -> Result<Option<ArtifactBlob>, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::GetArtifactBlob, artifact_id.to_string())
            .map_err(|e| rpc_error("GetArtifactBlob", e))?
    }

    pub async fn next_artifact_version(&self, post_id: &str, step: Step) -> Result<i64, ForgeError> {
        ractor::call!(
            self.actor,
            DbActorMessage::NextArtifactVersion,
            post_id.to_string(),
            step
        )
        .map_err(|e| rpc_error("NextArtifactVersion", e))?
    }

    pub async fn activate_artifact(
        &self,
        post_id: &str,
        artifact_id: &str,
    ) -> Result<DbPostArtifact, ForgeError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ActivateArtifact,
            post_id.to_string(),
            artifact_id.to_string()
        )
        .map_err(|e| rpc_error("ActivateArtifact", e))?
    }

    pub async fn list_plans(
        &self,
        project_id: &str,
        limit: i64,
    ) -> Result<Vec<DbEditorialPlan>, ForgeError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ListPlans,
            project_id.to_string(),
            limit
        )
        .map_err(|e| rpc_error("ListPlans", e))?
    }

    pub async fn get_plan(
        &self,
        plan_id: &str,
    ) -> Result<(DbEditorialPlan, Vec<DbEditorialPlanItem>), ForgeError> {
        ractor::call!(self.actor, DbActorMessage::GetPlan, plan_id.to_string())
            .map_err(|e| rpc_error("GetPlan", e))?
    }

    pub async fn set_plan_item_status(
        &self,
        post_id: &str,
        status: PlanItemStatus,
    ) -> Result<(), ForgeError> {
        ractor::call!(
            self.actor,
            DbActorMessage::SetPlanItemStatus,
            post_id.to_string(),
            status
        )
        .map_err(|e| rpc_error("SetPlanItemStatus", e))?
    }

    pub async fn reserve_key(
        &self,
        scope: &str,
        key_hash: &str,
        now: DateTime<Utc>,
        ttl: chrono::Duration,
    ) -> Result<Reservation, ForgeError> {
        ractor::call!(
            self.actor,
            DbActorMessage::ReserveKey,
            scope.to_string(),
            key_hash.to_string(),
            now,
            ttl
        )
        .map_err(|e| rpc_error("ReserveKey", e))?
    }

    pub async fn complete_key(&self, key_hash: &str, result: Value) -> Result<(), ForgeError> {
        ractor::call!(
            self.actor,
            DbActorMessage::CompleteKey,
            key_hash.to_string(),
            result
        )
        .map_err(|e| rpc_error("CompleteKey", e))?
    }

    pub async fn fail_key(&self, key_hash: &str, error: String) -> Result<(), ForgeError> {
        ractor::call!(self.actor, DbActorMessage::FailKey, key_hash.to_string(), error)
            .map_err(|e| rpc_error("FailKey", e))?
    }

    pub async fn get_key(&self, key_hash: &str) -> Result<Option<DbIdempotencyKey>, ForgeError> {
        ractor::call!(self.actor, DbActorMessage::GetKey, key_hash.to_string())
            .map_err(|e| rpc_error("GetKey", e))?
    }
}

struct DbActorState {
    pool: SqlitePool,
}

struct DbActor;

#[ractor::async_trait]
impl Actor for DbActor {
    type Msg = DbActorMessage;
    type State = DbActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("DbActor initialized");
        Ok(DbActorState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let pool = &state.pool;
        match message {
            DbActorMessage::CreateAgency(create, reply) => {
                let _ = reply.send(projects::create_agency(pool, create).await);
            }
            DbActorMessage::CreateProject(create, reply) => {
                let _ = reply.send(projects::create_project(pool, create).await);
            }
            DbActorMessage::GetProject(id, reply) => {
                let _ = reply.send(projects::get_project(pool, &id).await);
            }
            DbActorMessage::FindProjectByLicense(key, reply) => {
                let _ = reply.send(projects::find_project_by_license(pool, &key).await);
            }
            DbActorMessage::CreateBatch(create, reply) => {
                let _ = reply.send(posts::create_batch(pool, create).await);
            }
            DbActorMessage::GetBatch(id, reply) => {
                let _ = reply.send(posts::get_batch(pool, &id).await);
            }
            DbActorMessage::MarkBatchRunning(id, reply) => {
                let _ = reply.send(posts::mark_batch_running(pool, &id).await);
            }
            DbActorMessage::FailBatch(id, error, reply) => {
                let _ = reply.send(posts::fail_batch(pool, &id, error).await);
            }
            DbActorMessage::RecordBatchItem(batch_id, post_id, outcome, reply) => {
                let res = posts::record_batch_item(pool, &batch_id, &post_id, outcome).await;
                let _ = reply.send(res);
            }
            DbActorMessage::GetPost(id, reply) => {
                let _ = reply.send(posts::get_post(pool, &id).await);
            }
            DbActorMessage::ListBatchPosts(batch_id, reply) => {
                let _ = reply.send(posts::list_batch_posts(pool, &batch_id).await);
            }
            DbActorMessage::PatchPost(id, patch, reply) => {
                let _ = reply.send(posts::patch_post(pool, &id, patch).await);
            }
            DbActorMessage::AppendPostError(id, entry, reply) => {
                let _ = reply.send(posts::append_post_error(pool, &id, entry).await);
            }
            DbActorMessage::DeletePost(id, reply) => {
                let _ = reply.send(posts::delete_post(pool, &id).await);
            }
            DbActorMessage::InsertArtifact(create, reply) => {
                let _ = reply.send(artifacts::insert_artifact(pool, create).await);
            }
            DbActorMessage::ActiveArtifact(post_id, step, reply) => {
                let _ = reply.send(artifacts::active_artifact(pool, &post_id, step).await);
            }
            DbActorMessage::ListArtifacts(post_id, reply) => {
                let _ = reply.send(artifacts::list_artifacts(pool, &post_id).await);
            }
            DbActorMessage::GetArtifactBlob(artifact_id, reply) => {
                let _ = reply.send(artifacts::artifact_blob(pool, &artifact_id).await);
            }
            DbActorMessage::NextArtifactVersion(post_id, step, reply) => {
                let _ = reply.send(artifacts::next_artifact_version(pool, &post_id, step).await);
            }
            DbActorMessage::ActivateArtifact(post_id, artifact_id, reply) => {
                let res = artifacts::activate_artifact(pool, &post_id, &artifact_id).await;
                let _ = reply.send(res);
            }
            DbActorMessage::ListPlans(project_id, limit, reply) => {
                let _ = reply.send(plans::list_plans(pool, &project_id, limit).await);
            }
            DbActorMessage::GetPlan(plan_id, reply) => {
                let _ = reply.send(plans::get_plan(pool, &plan_id).await);
            }
            DbActorMessage::SetPlanItemStatus(post_id, status, reply) => {
                let _ = reply.send(plans::set_plan_item_status(pool, &post_id, status).await);
            }
            DbActorMessage::ReserveKey(scope, key_hash, now, ttl, reply) => {
                let res = idempotency::reserve_key(pool, &scope, &key_hash, now, ttl).await;
                let _ = reply.send(res);
            }
            DbActorMessage::CompleteKey(key_hash, result, reply) => {
                let _ = reply.send(idempotency::complete_key(pool, &key_hash, result).await);
            }
            DbActorMessage::FailKey(key_hash, error, reply) => {
                let _ = reply.send(idempotency::fail_key(pool, &key_hash, error).await);
            }
            DbActorMessage::GetKey(key_hash, reply) => {
                let _ = reply.send(idempotency::get_key(pool, &key_hash).await);
            }
        }
        Ok(())
    }
}

/// Spawn the database actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> Result<DbActorHandle, ForgeError> {
    let (actor, _jh) = Actor::spawn(None, DbActor, database_url.to_string())
        .await
        .map_err(|e| ForgeError::RactorError(format!("failed to spawn DbActor: {e}")))?;

    Ok(DbActorHandle { actor })
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), ForgeError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
