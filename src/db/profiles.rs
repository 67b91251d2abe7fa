use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{ProfileRow, Role};

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    id: Uuid,
    name: &str,
    company_id: Uuid,
    role: Role,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO profiles (id, name, company_id, role) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(name)
        .bind(company_id)
        .bind(role)
        .execute(executor)
        .await?;
    Ok(())
}

/// Profile joined with its company name.
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<ProfileRow>, sqlx::Error> {
    sqlx::query_as::<_, ProfileRow>(
        "SELECT p.id, p.name, p.company_id, p.role, c.name AS company_name
         FROM profiles p
         LEFT JOIN companies c ON c.id = p.company_id
         WHERE p.id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

pub async fn count_by_company(pool: &PgPool, company_id: Uuid) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM profiles WHERE company_id = $1")
        .bind(company_id)
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}

pub async fn is_member(pool: &PgPool, id: Uuid, company_id: Uuid) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as(
        "SELECT EXISTS(SELECT 1 FROM profiles WHERE id = $1 AND company_id = $2)",
    )
    .bind(id)
    .bind(company_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}
