use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::extractor::Member;
use crate::db;
use crate::error::AppError;
use crate::models::Role;
use crate::state::SharedState;

#[derive(Debug, Serialize, Deserialize)]
pub struct CompanyResponse {
    pub id: Uuid,
    pub name: String,
    /// Only admins get to see and share the join code.
    pub join_code: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: i64,
}

pub async fn get_company(
    member: Member,
    State(state): State<SharedState>,
) -> Result<Json<CompanyResponse>, AppError> {
    let company = db::companies::find_by_id(&state.pool, member.company_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Company not found".to_string()))?;

    let join_code = member.is_admin().then_some(company.join_code);

    Ok(Json(CompanyResponse {
        id: company.id,
        name: company.name,
        join_code,
        role: member.role,
        created_at: company.created_at,
    }))
}

pub async fn member_count(
    member: Member,
    State(state): State<SharedState>,
    Path(company_id): Path<Uuid>,
) -> Result<Json<CountResponse>, AppError> {
    if company_id != member.company_id {
        return Err(AppError::Forbidden(
            "Not a member of this company".to_string(),
        ));
    }

    let count = db::profiles::count_by_company(&state.pool, company_id).await?;
    Ok(Json(CountResponse { count }))
}
