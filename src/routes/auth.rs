use std::sync::LazyLock;

use axum::extract::State;
use axum::Json;
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::auth::extractor::AuthUser;
use crate::auth::jwt::{self, Claims, encode_token};
use crate::auth::password;
use crate::db;
use crate::error::AppError;
use crate::models::{Company, Identity, Role};
use crate::state::SharedState;

pub const ALREADY_REGISTERED: &str = "User already registered";

const REFRESH_TOKEN_DAYS: i64 = 7;
const JOIN_CODE_LEN: usize = 8;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

#[derive(Debug, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub company_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: Identity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// How a new account attaches to a tenant.
enum CompanyChoice {
    Create(String),
    Join(String),
}

fn auth_cookies(access_token: &str, refresh_token: &str) -> CookieJar {
    let access = Cookie::build(("access_token", access_token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(jwt::ACCESS_TOKEN_MINUTES))
        .build();

    let refresh = Cookie::build(("refresh_token", refresh_token.to_string()))
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(REFRESH_TOKEN_DAYS))
        .build();

    CookieJar::new().add(access).add(refresh)
}

fn clear_auth_cookies() -> CookieJar {
    let access = Cookie::build(("access_token", ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    let refresh = Cookie::build(("refresh_token", ""))
        .path("/")
        .max_age(time::Duration::ZERO)
        .build();
    CookieJar::new().add(access).add(refresh)
}

fn generate_refresh_token() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_join_code() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(JOIN_CODE_LEN)
        .map(|b| char::from(b).to_ascii_uppercase())
        .collect()
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn company_choice(req: &SignupRequest) -> Result<CompanyChoice, AppError> {
    match (
        non_blank(req.company_name.as_deref()),
        non_blank(req.company_code.as_deref()),
    ) {
        (Some(name), None) => Ok(CompanyChoice::Create(name)),
        (None, Some(code)) => Ok(CompanyChoice::Join(code.to_uppercase())),
        _ => Err(AppError::BadRequest(
            "Provide either a company name or a company code".to_string(),
        )),
    }
}

/// Issue an access token and a fresh refresh token for the identity.
async fn issue_tokens(
    state: &SharedState,
    identity: Identity,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let claims = Claims::new(identity.id, &identity.email);
    let access_token =
        encode_token(&claims, &state.config.jwt_secret).map_err(AppError::Internal)?;

    let refresh = generate_refresh_token();
    db::refresh_tokens::create(
        &state.pool,
        identity.id,
        &hash_token(&refresh),
        Utc::now() + Duration::days(REFRESH_TOKEN_DAYS),
    )
    .await?;

    let jar = auth_cookies(&access_token, &refresh);
    Ok((
        jar,
        Json(AuthResponse {
            access_token,
            refresh_token: refresh,
            user: identity,
        }),
    ))
}

pub async fn signup(
    State(state): State<SharedState>,
    Json(req): Json<SignupRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let email = normalize_email(&req.email);
    let name = req.name.trim().to_string();

    if email.is_empty() || req.password.is_empty() || name.is_empty() {
        return Err(AppError::BadRequest("All fields are required".to_string()));
    }

    if !EMAIL_RE.is_match(&email) {
        return Err(AppError::BadRequest("Invalid email address".to_string()));
    }

    if !password::is_strong_enough(&req.password) {
        return Err(AppError::BadRequest(format!(
            "Password must be at least {} characters",
            password::MIN_PASSWORD_LEN
        )));
    }

    let choice = company_choice(&req)?;
    let pw_hash = password::hash(&req.password).map_err(AppError::Internal)?;

    let mut tx = state.pool.begin().await?;

    if db::identities::exists_by_email(&mut *tx, &email).await? {
        return Err(AppError::Conflict(ALREADY_REGISTERED.to_string()));
    }

    let signup_company_name = match &choice {
        CompanyChoice::Create(company_name) => Some(company_name.as_str()),
        CompanyChoice::Join(_) => None,
    };

    let identity = db::identities::create(
        &mut *tx,
        &email,
        &pw_hash,
        Some(&name),
        signup_company_name,
    )
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            AppError::Conflict(ALREADY_REGISTERED.to_string())
        }
        _ => AppError::Database(e),
    })?;

    let (company, role): (Company, Role) = match choice {
        CompanyChoice::Create(company_name) => {
            let company = db::companies::create(&mut *tx, &company_name, &generate_join_code())
                .await
                .map_err(|e| AppError::Internal(format!("Failed to create company: {e}")))?;
            (company, Role::Admin)
        }
        CompanyChoice::Join(code) => {
            let company = db::companies::find_by_join_code(&mut *tx, &code)
                .await?
                .ok_or_else(|| AppError::BadRequest("Invalid company code".to_string()))?;
            (company, Role::Member)
        }
    };

    db::profiles::create(&mut *tx, identity.id, &name, company.id, role).await?;

    tx.commit().await?;

    tracing::info!(
        "Identity {} signed up as {role} of company {}",
        identity.id,
        company.id
    );

    issue_tokens(&state, identity).await
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let email = normalize_email(&req.email);

    if state.login_limiter.check(&email).is_err() {
        return Err(AppError::RateLimited(
            "Too many login attempts. Please try again later.".to_string(),
        ));
    }

    let credentials = db::identities::find_credentials(&state.pool, &email)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid login credentials".to_string()))?;

    let valid =
        password::verify(&req.password, &credentials.password_hash).map_err(AppError::Internal)?;

    if !valid {
        state.login_limiter.record_failure(&email);
        return Err(AppError::Unauthorized(
            "Invalid login credentials".to_string(),
        ));
    }

    state.login_limiter.reset(&email);

    let identity = db::identities::find_by_id(&state.pool, credentials.id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid login credentials".to_string()))?;

    tracing::debug!("Identity {} logged in", identity.id);

    issue_tokens(&state, identity).await
}

pub async fn refresh(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<AuthResponse>), AppError> {
    let refresh_value = jar
        .get("refresh_token")
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized("Missing refresh token".to_string()))?;

    let stored = db::refresh_tokens::find_by_hash(&state.pool, &hash_token(&refresh_value))
        .await?
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

    if stored.used {
        tracing::warn!(
            "Refresh token reuse detected for identity {}. Revoking all sessions.",
            stored.identity_id
        );
        db::refresh_tokens::delete_all_for_identity(&state.pool, stored.identity_id).await?;
        return Err(AppError::Unauthorized(
            "Refresh token reuse detected. All sessions revoked.".to_string(),
        ));
    }

    if stored.expires_at < Utc::now() {
        return Err(AppError::Unauthorized("Refresh token expired".to_string()));
    }

    db::refresh_tokens::mark_used(&state.pool, stored.id).await?;

    let identity = db::identities::find_by_id(&state.pool, stored.identity_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    issue_tokens(&state, identity).await
}

pub async fn logout(
    State(state): State<SharedState>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    if let Some(cookie) = jar.get("refresh_token") {
        db::refresh_tokens::delete_by_hash(&state.pool, &hash_token(cookie.value())).await?;
    }

    Ok((
        clear_auth_cookies(),
        Json(MessageResponse {
            message: "Logged out successfully".to_string(),
        }),
    ))
}

pub async fn current_user(
    auth: AuthUser,
    State(state): State<SharedState>,
) -> Result<Json<Identity>, AppError> {
    let identity = db::identities::find_by_id(&state.pool, auth.identity_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;
    Ok(Json(identity))
}
