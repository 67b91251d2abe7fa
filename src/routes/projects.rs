use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::extractor::Member;
use crate::db;
use crate::error::AppError;
use crate::models::{Project, ProjectChanges};
use crate::state::SharedState;

const MAX_NAME_LEN: usize = 200;

#[derive(Deserialize)]
pub struct CreateProject {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// When present it must match the caller's company.
    #[serde(default)]
    pub company_id: Option<Uuid>,
}

pub async fn list(
    member: Member,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Project>>, AppError> {
    let projects = db::projects::list(&state.pool, member.company_id).await?;
    Ok(Json(projects))
}

pub async fn create(
    member: Member,
    State(state): State<SharedState>,
    Json(req): Json<CreateProject>,
) -> Result<Json<Project>, AppError> {
    if let Some(company_id) = req.company_id {
        member.require_company(company_id)?;
    }

    let name = validate_name(&req.name)?;

    let project = db::projects::create(
        &state.pool,
        member.company_id,
        name,
        req.description.as_deref(),
    )
    .await?;

    tracing::debug!(
        "Project {} created in company {} by {}",
        project.id,
        member.company_id,
        member.identity_id
    );

    Ok(Json(project))
}

pub async fn get(
    member: Member,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, AppError> {
    let project = db::projects::find_by_id(&state.pool, id, member.company_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;
    Ok(Json(project))
}

pub async fn update(
    member: Member,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProjectChanges>,
) -> Result<Json<Project>, AppError> {
    let name = req.name.as_deref().map(validate_name).transpose()?;

    let project = db::projects::update(
        &state.pool,
        id,
        member.company_id,
        name,
        req.description.as_deref(),
    )
    .await
    .map_err(|e| match e {
        sqlx::Error::RowNotFound => AppError::NotFound("Project not found".to_string()),
        _ => AppError::Database(e),
    })?;

    Ok(Json(project))
}

pub async fn delete(
    member: Member,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !db::projects::delete(&state.pool, id, member.company_id).await? {
        return Err(AppError::NotFound("Project not found".to_string()));
    }

    tracing::debug!("Project {id} deleted by {}", member.identity_id);

    Ok(Json(serde_json::json!({ "message": "Deleted" })))
}

fn validate_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "Project name must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    Ok(name)
}
