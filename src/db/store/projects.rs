use chrono::Utc;
use sqlx::{SqlitePool, types::Json};

use super::new_id;
use crate::db::models::{DbAgency, DbProject};
use crate::db::patch::{AgencyCreate, ProjectCreate};
use crate::error::ForgeError;

macro_rules! project_columns {
    () => {
        "id, agency_id, name, wp_url, wp_username, wp_app_password, license_key, settings, \
         whatsapp_phone, created_at, updated_at"
    };
}

pub(in crate::db) async fn create_agency(
    pool: &SqlitePool,
    create: AgencyCreate,
) -> Result<DbAgency, ForgeError> {
    let agency = DbAgency {
        id: new_id(),
        name: create.name,
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO agencies (id, name, created_at) VALUES (?, ?, ?)")
        .bind(&agency.id)
        .bind(&agency.name)
        .bind(agency.created_at)
        .execute(pool)
        .await?;

    Ok(agency)
}

pub(in crate::db) async fn create_project(
    pool: &SqlitePool,
    create: ProjectCreate,
) -> Result<DbProject, ForgeError> {
    let agency_exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM agencies WHERE id = ?")
        .bind(&create.agency_id)
        .fetch_optional(pool)
        .await?;
    if agency_exists.is_none() {
        return Err(ForgeError::not_found("agency", create.agency_id));
    }

    let now = Utc::now();
    let project = DbProject {
        id: new_id(),
        agency_id: create.agency_id,
        name: create.name,
        wp_url: create.wp_url,
        wp_username: create.wp_username,
        wp_app_password: create.wp_app_password,
        license_key: create
            .license_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(generate_license_key),
        settings: Json(create.settings),
        whatsapp_phone: create.whatsapp_phone,
        created_at: now,
        updated_at: now,
    };

    sqlx::query(concat!(
        "INSERT INTO projects (",
        project_columns!(),
        ") VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&project.id)
    .bind(&project.agency_id)
    .bind(&project.name)
    .bind(&project.wp_url)
    .bind(&project.wp_username)
    .bind(&project.wp_app_password)
    .bind(&project.license_key)
    .bind(&project.settings)
    .bind(&project.whatsapp_phone)
    .bind(project.created_at)
    .bind(project.updated_at)
    .execute(pool)
    .await?;

    Ok(project)
}

pub(in crate::db) async fn get_project(
    pool: &SqlitePool,
    id: &str,
) -> Result<DbProject, ForgeError> {
    sqlx::query_as::<_, DbProject>(concat!(
        "SELECT ",
        project_columns!(),
        " FROM projects WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ForgeError::not_found("project", id))
}

pub(in crate::db) async fn find_project_by_license(
    pool: &SqlitePool,
    license_key: &str,
) -> Result<Option<DbProject>, ForgeError> {
    let row = sqlx::query_as::<_, DbProject>(concat!(
        "SELECT ",
        project_columns!(),
        " FROM projects WHERE license_key = ?"
    ))
    .bind(license_key)
    .fetch_optional(pool)
    .await?;

    Ok(row)
}

fn generate_license_key() -> String {
    format!("wpf_{}", uuid::Uuid::new_v4().simple())
}
