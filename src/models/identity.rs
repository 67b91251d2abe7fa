use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata captured at signup time and kept alongside the identity.
///
/// The profile resolver falls back to these values when the profile row is
/// not readable yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct IdentityMetadata {
    pub name: Option<String>,
    pub company_name: Option<String>,
}

/// Raw authenticated identity as issued by the identity store.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
    #[sqlx(flatten)]
    #[serde(default)]
    pub metadata: IdentityMetadata,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdentityCredentials {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
}
