use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Project;

pub async fn list(pool: &PgPool, company_id: Uuid) -> Result<Vec<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "SELECT * FROM projects WHERE company_id = $1 ORDER BY created_at DESC, id DESC",
    )
    .bind(company_id)
    .fetch_all(pool)
    .await
}

pub async fn create(
    pool: &PgPool,
    company_id: Uuid,
    name: &str,
    description: Option<&str>,
) -> Result<Project, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "INSERT INTO projects (id, name, description, company_id)
         VALUES ($1, $2, NULLIF($3, ''), $4) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(name)
    .bind(description)
    .bind(company_id)
    .fetch_one(pool)
    .await
}

pub async fn find_by_id(
    pool: &PgPool,
    id: Uuid,
    company_id: Uuid,
) -> Result<Option<Project>, sqlx::Error> {
    sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1 AND company_id = $2")
        .bind(id)
        .bind(company_id)
        .fetch_optional(pool)
        .await
}

/// Partial update; `None` keeps the column, an empty description clears it.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    company_id: Uuid,
    name: Option<&str>,
    description: Option<&str>,
) -> Result<Project, sqlx::Error> {
    sqlx::query_as::<_, Project>(
        "UPDATE projects
         SET name = COALESCE($3, name),
             description = CASE WHEN $4::text IS NULL THEN description ELSE NULLIF($4, '') END
         WHERE id = $1 AND company_id = $2
         RETURNING *",
    )
    .bind(id)
    .bind(company_id)
    .bind(name)
    .bind(description)
    .fetch_one(pool)
    .await
}

/// Returns false when nothing matched. Tasks go with the project through the
/// foreign key cascade.
pub async fn delete(pool: &PgPool, id: Uuid, company_id: Uuid) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM projects WHERE id = $1 AND company_id = $2")
        .bind(id)
        .bind(company_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
