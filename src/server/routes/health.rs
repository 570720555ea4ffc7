use crate::queue::QueueStats;
use crate::server::router::ForgeState;

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue: Option<QueueStats>,
}

/// GET /healthz
pub async fn healthz(State(state): State<ForgeState>) -> Json<Health> {
    let queue = match state.queue.stats().await {
        Ok(stats) => Some(stats),
        Err(e) => {
            warn!(error = %e, "queue stats unavailable");
            None
        }
    };
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        queue,
    })
}

pub fn router() -> Router<ForgeState> {
    Router::new().route("/healthz", get(healthz))
}
