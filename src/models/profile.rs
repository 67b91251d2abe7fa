use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Placeholder company id used when a profile cannot be tied to a real company.
pub const TEMP_COMPANY_ID: &str = "temp";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "member_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Company reference carried by a resolved profile.
///
/// Serialized as the company uuid, or as `"temp"` when unresolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CompanyId {
    Known(Uuid),
    Temp,
}

impl CompanyId {
    pub fn known(&self) -> Option<Uuid> {
        match self {
            CompanyId::Known(id) => Some(*id),
            CompanyId::Temp => None,
        }
    }

    pub fn is_temp(&self) -> bool {
        matches!(self, CompanyId::Temp)
    }
}

impl From<Option<Uuid>> for CompanyId {
    fn from(id: Option<Uuid>) -> Self {
        id.map_or(CompanyId::Temp, CompanyId::Known)
    }
}

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompanyId::Known(id) => write!(f, "{id}"),
            CompanyId::Temp => f.write_str(TEMP_COMPANY_ID),
        }
    }
}

impl FromStr for CompanyId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == TEMP_COMPANY_ID {
            return Ok(CompanyId::Temp);
        }
        s.parse::<Uuid>()
            .map(CompanyId::Known)
            .map_err(|e| format!("Invalid company id '{s}': {e}"))
    }
}

impl TryFrom<String> for CompanyId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CompanyId> for String {
    fn from(id: CompanyId) -> Self {
        id.to_string()
    }
}

/// Persisted profile row joined with its company name. Every column is
/// nullable; the resolver fills the gaps.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: Uuid,
    pub name: Option<String>,
    pub company_id: Option<Uuid>,
    pub role: Option<Role>,
    pub company_name: Option<String>,
}

/// Tenant-scoped user record derived from an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub company_id: CompanyId,
    pub company_name: String,
    pub role: Role,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
