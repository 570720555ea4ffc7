//! Operator routes for onboarding agencies and their WordPress projects.

use crate::db::{AgencyCreate, DbAgency, DbProject, ProjectCreate, ProjectSettings};
use crate::error::ForgeError;
use crate::server::router::ForgeState;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use url::Url;

/// Project as shown to the operator; the application password never leaves the server.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectView {
    pub id: String,
    pub agency_id: String,
    pub name: String,
    pub wp_url: String,
    pub wp_username: String,
    pub license_key: String,
    pub settings: ProjectSettings,
    pub whatsapp_phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbProject> for ProjectView {
    fn from(p: DbProject) -> Self {
        Self {
            id: p.id,
            agency_id: p.agency_id,
            name: p.name,
            wp_url: p.wp_url,
            wp_username: p.wp_username,
            license_key: p.license_key,
            settings: p.settings.0,
            whatsapp_phone: p.whatsapp_phone,
            created_at: p.created_at,
        }
    }
}

pub async fn create_agency(
    State(state): State<ForgeState>,
    payload: Result<Json<AgencyCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<DbAgency>), ForgeError> {
    let Json(create) = payload?;
    if create.name.trim().is_empty() {
        return Err(ForgeError::BadRequest("agency name is required".to_string()));
    }
    let agency = state.db.create_agency(create).await?;
    info!(agency_id = %agency.id, "agency created");
    Ok((StatusCode::CREATED, Json(agency)))
}

pub async fn create_project(
    State(state): State<ForgeState>,
    payload: Result<Json<ProjectCreate>, JsonRejection>,
) -> Result<(StatusCode, Json<ProjectView>), ForgeError> {
    let Json(create) = payload?;
    let wp_url = Url::parse(&create.wp_url)
        .map_err(|e| ForgeError::BadRequest(format!("invalid wp_url: {e}")))?;
    if !matches!(wp_url.scheme(), "http" | "https") {
        return Err(ForgeError::BadRequest(
            "wp_url must be an http(s) URL".to_string(),
        ));
    }
    if create.wp_username.trim().is_empty() || create.wp_app_password.trim().is_empty() {
        return Err(ForgeError::BadRequest(
            "WordPress credentials are required".to_string(),
        ));
    }

    let project = state.db.create_project(create).await?;
    info!(project_id = %project.id, agency_id = %project.agency_id, "project created");
    Ok((StatusCode::CREATED, Json(project.into())))
}

pub async fn get_project(
    State(state): State<ForgeState>,
    Path(project_id): Path<String>,
) -> Result<Json<ProjectView>, ForgeError> {
    let project = state.db.get_project(&project_id).await?;
    Ok(Json(project.into()))
}

pub fn router() -> Router<ForgeState> {
    Router::new()
        .route("/admin/agencies", post(create_agency))
        .route("/admin/projects", post(create_project))
        .route("/admin/projects/{id}", get(get_project))
}
