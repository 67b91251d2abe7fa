use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Identity, IdentityCredentials};

pub async fn create<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    email: &str,
    password_hash: &str,
    name: Option<&str>,
    company_name: Option<&str>,
) -> Result<Identity, sqlx::Error> {
    sqlx::query_as::<_, Identity>(
        "INSERT INTO identities (id, email, password_hash, name, company_name)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, email, name, company_name",
    )
    .bind(Uuid::now_v7())
    .bind(email)
    .bind(password_hash)
    .bind(name)
    .bind(company_name)
    .fetch_one(executor)
    .await
}

pub async fn exists_by_email<'e, E: sqlx::PgExecutor<'e>>(
    executor: E,
    email: &str,
) -> Result<bool, sqlx::Error> {
    let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM identities WHERE email = $1)")
        .bind(email)
        .fetch_one(executor)
        .await?;
    Ok(row.0)
}

pub async fn find_credentials(
    pool: &PgPool,
    email: &str,
) -> Result<Option<IdentityCredentials>, sqlx::Error> {
    sqlx::query_as::<_, IdentityCredentials>(
        "SELECT id, email, password_hash FROM identities WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Identity>, sqlx::Error> {
    sqlx::query_as::<_, Identity>(
        "SELECT id, email, name, company_name FROM identities WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
