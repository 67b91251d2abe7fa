use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::extractor::Member;
use crate::db;
use crate::error::AppError;
use crate::models::{Task, TaskChanges, TaskStatus};
use crate::state::SharedState;

const MAX_TITLE_LEN: usize = 200;

#[derive(Deserialize)]
pub struct CreateTask {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    pub project_id: Uuid,
    #[serde(default)]
    pub assigned_user_id: Option<Uuid>,
    /// When present it must match the caller's company.
    #[serde(default)]
    pub company_id: Option<Uuid>,
}

pub async fn list(
    member: Member,
    State(state): State<SharedState>,
) -> Result<Json<Vec<Task>>, AppError> {
    let tasks = db::tasks::list(&state.pool, member.company_id).await?;
    Ok(Json(tasks))
}

pub async fn create(
    member: Member,
    State(state): State<SharedState>,
    Json(req): Json<CreateTask>,
) -> Result<Json<Task>, AppError> {
    if let Some(company_id) = req.company_id {
        member.require_company(company_id)?;
    }

    let title = validate_title(&req.title)?;
    let assignee = req.assigned_user_id.unwrap_or(member.identity_id);

    verify_project(&state, &member, req.project_id).await?;
    verify_assignee(&state, &member, assignee).await?;

    let task = db::tasks::create(
        &state.pool,
        member.company_id,
        req.project_id,
        title,
        req.description.as_deref(),
        req.status,
        assignee,
    )
    .await?;

    tracing::debug!(
        "Task {} created in project {} by {}",
        task.id,
        task.project_id,
        member.identity_id
    );

    Ok(Json(task))
}

pub async fn get(
    member: Member,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Task>, AppError> {
    let task = db::tasks::find_by_id(&state.pool, id, member.company_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Task not found".to_string()))?;
    Ok(Json(task))
}

pub async fn update(
    member: Member,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(mut changes): Json<TaskChanges>,
) -> Result<Json<Task>, AppError> {
    if let Some(title) = changes.title.as_deref() {
        changes.title = Some(validate_title(title)?.to_string());
    }
    if let Some(project_id) = changes.project_id {
        verify_project(&state, &member, project_id).await?;
    }
    if let Some(assignee) = changes.assigned_user_id {
        verify_assignee(&state, &member, assignee).await?;
    }

    let task = db::tasks::update(&state.pool, id, member.company_id, &changes)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Task not found".to_string()),
            _ => AppError::Database(e),
        })?;

    Ok(Json(task))
}

pub async fn delete(
    member: Member,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !db::tasks::delete(&state.pool, id, member.company_id).await? {
        return Err(AppError::NotFound("Task not found".to_string()));
    }

    Ok(Json(serde_json::json!({ "message": "Deleted" })))
}

/// A task may only point at a project of the caller's own company.
async fn verify_project(
    state: &SharedState,
    member: &Member,
    project_id: Uuid,
) -> Result<(), AppError> {
    db::projects::find_by_id(&state.pool, project_id, member.company_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Project not found".to_string()))?;
    Ok(())
}

async fn verify_assignee(
    state: &SharedState,
    member: &Member,
    assignee: Uuid,
) -> Result<(), AppError> {
    if assignee == member.identity_id {
        return Ok(());
    }
    if !db::profiles::is_member(&state.pool, assignee, member.company_id).await? {
        return Err(AppError::BadRequest(
            "Assignee is not a member of this company".to_string(),
        ));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<&str, AppError> {
    let title = title.trim();
    if title.is_empty() || title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::BadRequest(format!(
            "Task title must be between 1 and {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(title)
}
