//! SQL for each table group. Only the DB actor calls into this module.

pub(super) mod artifacts;
pub(super) mod idempotency;
pub(super) mod plans;
pub(super) mod posts;
pub(super) mod projects;

pub(super) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

macro_rules! post_columns {
    () => {
        "id, project_id, batch_job_id, keyword, title, status, wp_post_id, wp_link, \
         tokens_in, tokens_out, cost_usd, error_log, created_at, updated_at"
    };
}

macro_rules! artifact_columns {
    () => {
        "id, post_id, step, version, is_active, content, model, tokens_in, tokens_out, \
         cost_usd, created_at"
    };
}

macro_rules! batch_columns {
    () => {
        "id, project_id, source_name, status, total, processed, failed, attempts, error, \
         created_at, updated_at"
    };
}

pub(super) use {artifact_columns, batch_columns, post_columns};
