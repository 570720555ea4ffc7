pub mod handlers;
pub mod views;

use crate::server::router::ForgeState;
use handlers::{
    activate_artifact, bulk_delete, delete_post, estimate, get_batch, get_plan, get_post,
    list_plans, publish_post, regenerate_post, submit_csv, submit_keywords,
};

use axum::{
    Router,
    routing::{get, post},
};

pub fn router() -> Router<ForgeState> {
    Router::new()
        .route("/api/v1/keywords", post(submit_keywords))
        .route("/api/v1/batches/csv", post(submit_csv))
        .route("/api/v1/batches/{id}", get(get_batch))
        .route("/api/v1/plans", get(list_plans))
        .route("/api/v1/plans/{id}", get(get_plan))
        .route("/api/v1/posts/bulk-delete", post(bulk_delete))
        .route("/api/v1/posts/{id}", get(get_post).delete(delete_post))
        .route("/api/v1/posts/{id}/publish", post(publish_post))
        .route("/api/v1/posts/{id}/regenerate", post(regenerate_post))
        .route(
            "/api/v1/posts/{id}/artifacts/{artifact_id}/activate",
            post(activate_artifact),
        )
        .route("/api/v1/estimate", post(estimate))
}
