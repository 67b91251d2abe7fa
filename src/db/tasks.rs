use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Task, TaskChanges, TaskStatus};

const SELECT_WITH_PROJECT: &str = "SELECT t.*, p.name AS project_name
     FROM tasks t
     LEFT JOIN projects p ON p.id = t.project_id";

pub async fn list(pool: &PgPool, company_id: Uuid) -> Result<Vec<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "{SELECT_WITH_PROJECT} WHERE t.company_id = $1 ORDER BY t.created_at DESC, t.id DESC"
    ))
    .bind(company_id)
    .fetch_all(pool)
    .await
}

pub async fn find_by_id(
    pool: &PgPool,
    id: Uuid,
    company_id: Uuid,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(&format!(
        "{SELECT_WITH_PROJECT} WHERE t.id = $1 AND t.company_id = $2"
    ))
    .bind(id)
    .bind(company_id)
    .fetch_optional(pool)
    .await
}

#[allow(clippy::too_many_arguments)]
pub async fn create(
    pool: &PgPool,
    company_id: Uuid,
    project_id: Uuid,
    title: &str,
    description: Option<&str>,
    status: TaskStatus,
    assigned_user_id: Uuid,
) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "WITH t AS (
             INSERT INTO tasks (id, title, description, status, project_id, assigned_user_id, company_id)
             VALUES ($1, $2, NULLIF($3, ''), $4, $5, $6, $7)
             RETURNING *
         )
         SELECT t.*, p.name AS project_name FROM t LEFT JOIN projects p ON p.id = t.project_id",
    )
    .bind(Uuid::now_v7())
    .bind(title)
    .bind(description)
    .bind(status)
    .bind(project_id)
    .bind(assigned_user_id)
    .bind(company_id)
    .fetch_one(pool)
    .await
}

/// Partial update; `None` keeps the column, an empty description clears it.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    company_id: Uuid,
    changes: &TaskChanges,
) -> Result<Task, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        "WITH t AS (
             UPDATE tasks
             SET title = COALESCE($3, title),
                 description = CASE WHEN $4::text IS NULL THEN description ELSE NULLIF($4, '') END,
                 status = COALESCE($5, status),
                 project_id = COALESCE($6, project_id),
                 assigned_user_id = COALESCE($7, assigned_user_id)
             WHERE id = $1 AND company_id = $2
             RETURNING *
         )
         SELECT t.*, p.name AS project_name FROM t LEFT JOIN projects p ON p.id = t.project_id",
    )
    .bind(id)
    .bind(company_id)
    .bind(changes.title.as_deref())
    .bind(changes.description.as_deref())
    .bind(changes.status)
    .bind(changes.project_id)
    .bind(changes.assigned_user_id)
    .fetch_one(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: Uuid, company_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND company_id = $2")
        .bind(id)
        .bind(company_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
