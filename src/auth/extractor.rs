use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use uuid::Uuid;

use crate::auth::jwt;
use crate::db;
use crate::error::AppError;
use crate::models::Role;
use crate::state::SharedState;

/// Caller authenticated by access token. Carries no tenant information.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity_id: Uuid,
    pub email: String,
}

impl FromRequestParts<SharedState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        // Try Bearer token from Authorization header first
        if let Some(auth_header) = parts.headers.get("authorization") {
            let auth_str = auth_header
                .to_str()
                .map_err(|_| AppError::Unauthorized("Invalid authorization header".to_string()))?;

            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return from_token(token, &state.config.jwt_secret);
            }
        }

        // Try cookie-based auth
        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get("access_token") {
            return from_token(cookie.value(), &state.config.jwt_secret);
        }

        Err(AppError::Unauthorized(
            "Missing authentication token".to_string(),
        ))
    }
}

fn from_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let claims = jwt::decode_token(token, secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    Ok(AuthUser {
        identity_id: claims.sub,
        email: claims.email,
    })
}

/// Caller resolved to a company through their profile row.
///
/// The profile is read on every request, so a role or company change applies
/// to the very next call. Every tenant-scoped query binds `company_id` from
/// here.
#[derive(Debug, Clone)]
pub struct Member {
    pub identity_id: Uuid,
    pub email: String,
    pub company_id: Uuid,
    pub role: Role,
}

impl Member {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Row policy check for inserts carrying an explicit company id.
    pub fn require_company(&self, company_id: Uuid) -> Result<(), AppError> {
        if self.company_id == company_id {
            Ok(())
        } else {
            tracing::warn!(
                "Identity {} attempted a write into company {company_id}",
                self.identity_id
            );
            Err(AppError::Forbidden(
                "Row violates company policy".to_string(),
            ))
        }
    }
}

impl FromRequestParts<SharedState> for Member {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthUser::from_request_parts(parts, state).await?;

        let profile = db::profiles::find_by_id(&state.pool, auth.identity_id)
            .await?
            .ok_or(AppError::ProfileMissing)?;

        let company_id = profile.company_id.ok_or(AppError::ProfileMissing)?;

        Ok(Member {
            identity_id: auth.identity_id,
            email: auth.email,
            company_id,
            role: profile.role.unwrap_or_default(),
        })
    }
}
