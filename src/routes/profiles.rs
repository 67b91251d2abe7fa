use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use crate::auth::extractor::AuthUser;
use crate::db;
use crate::error::AppError;
use crate::models::ProfileRow;
use crate::state::SharedState;

/// A profile is readable by its owner and by members of the same company.
/// Anything else reads as `null`, the same as a missing row.
pub async fn get(
    auth: AuthUser,
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<ProfileRow>>, AppError> {
    let Some(profile) = db::profiles::find_by_id(&state.pool, id).await? else {
        return Ok(Json(None));
    };

    if profile.id == auth.identity_id {
        return Ok(Json(Some(profile)));
    }

    let caller_company = db::profiles::find_by_id(&state.pool, auth.identity_id)
        .await?
        .and_then(|p| p.company_id);

    let visible = caller_company.is_some() && caller_company == profile.company_id;
    Ok(Json(visible.then_some(profile)))
}
