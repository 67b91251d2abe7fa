//! Identity to profile resolution.
//!
//! Resolution never fails once an identity exists: a missing or unreadable
//! profile row degrades to a synthetic profile built from the signup metadata,
//! which covers the window between identity creation and profile creation.

use std::sync::Arc;

use crate::models::{CompanyId, Identity, Profile, ProfileRow};
use crate::tracker::identity::IdentityStore;
use crate::tracker::store::TenantStore;

pub const UNKNOWN_COMPANY: &str = "Unknown Company";
pub const DEFAULT_COMPANY: &str = "Default Company";

/// Outcome of resolving an identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Built from the persisted profile row.
    Resolved(Profile),
    /// Synthetic profile; the row was missing or could not be read.
    Degraded(Profile),
    /// No identity to resolve.
    Absent,
}

impl Resolution {
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            Resolution::Resolved(profile) | Resolution::Degraded(profile) => Some(profile),
            Resolution::Absent => None,
        }
    }

    pub fn into_profile(self) -> Option<Profile> {
        match self {
            Resolution::Resolved(profile) | Resolution::Degraded(profile) => Some(profile),
            Resolution::Absent => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Resolution::Degraded(_))
    }
}

#[derive(Clone)]
pub struct ProfileResolver {
    identity: Arc<dyn IdentityStore>,
    store: Arc<dyn TenantStore>,
}

impl ProfileResolver {
    pub fn new(identity: Arc<dyn IdentityStore>, store: Arc<dyn TenantStore>) -> Self {
        Self { identity, store }
    }

    /// Resolve whoever holds the current session.
    pub async fn resolve_current(&self) -> Resolution {
        match self.identity.get_user().await {
            Ok(Some(identity)) => self.resolve(&identity).await,
            Ok(None) => Resolution::Absent,
            Err(e) => {
                tracing::warn!("Could not read current identity: {e}");
                Resolution::Absent
            }
        }
    }

    pub async fn resolve(&self, identity: &Identity) -> Resolution {
        match self.store.fetch_profile(identity.id).await {
            Ok(Some(row)) => Resolution::Resolved(from_row(identity, row)),
            Ok(None) => {
                tracing::info!(
                    "No profile row for identity {}, using signup metadata",
                    identity.id
                );
                Resolution::Degraded(synthetic(identity))
            }
            Err(e) => {
                tracing::warn!("Profile lookup failed for identity {}: {e}", identity.id);
                Resolution::Degraded(synthetic(identity))
            }
        }
    }
}

fn from_row(identity: &Identity, row: ProfileRow) -> Profile {
    Profile {
        id: identity.id,
        email: identity.email.clone(),
        name: row.name.unwrap_or_else(|| identity.email.clone()),
        company_id: CompanyId::from(row.company_id),
        company_name: row
            .company_name
            .unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
        role: row.role.unwrap_or_default(),
    }
}

/// Profile built client-side from the identity alone.
pub fn synthetic(identity: &Identity) -> Profile {
    Profile {
        id: identity.id,
        email: identity.email.clone(),
        name: identity
            .metadata
            .name
            .clone()
            .unwrap_or_else(|| identity.email.clone()),
        company_id: CompanyId::Temp,
        company_name: identity
            .metadata
            .company_name
            .clone()
            .unwrap_or_else(|| DEFAULT_COMPANY.to_string()),
        role: Default::default(),
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::models::Role;
    use crate::tracker::testing::MemoryBackend;

    fn resolver(backend: &Arc<MemoryBackend>) -> ProfileResolver {
        ProfileResolver::new(backend.clone(), backend.clone())
    }

    #[tokio::test]
    async fn resolves_persisted_profile() {
        let backend = MemoryBackend::new();
        let identity = backend
            .sign_up_as("ada@acme.io", "Ada", Some("Acme"), None)
            .await;

        let resolution = resolver(&backend).resolve(&identity).await;
        let Resolution::Resolved(profile) = resolution else {
            panic!("expected a resolved profile");
        };
        assert_eq!(profile.name, "Ada");
        assert_eq!(profile.company_name, "Acme");
        assert_eq!(profile.role, Role::Admin);
        assert!(!profile.company_id.is_temp());
    }

    #[tokio::test]
    async fn missing_row_degrades_to_synthetic_member() {
        let backend = MemoryBackend::new();
        backend.set_skip_profiles(true);
        let identity = backend
            .sign_up_as("bob@acme.io", "Bob", Some("Acme"), None)
            .await;

        let resolution = resolver(&backend).resolve(&identity).await;
        assert!(resolution.is_degraded());
        let profile = resolution.into_profile().unwrap();
        assert_eq!(profile.company_id, CompanyId::Temp);
        assert_eq!(profile.role, Role::Member);
        assert_eq!(profile.name, "Bob");
        assert_eq!(profile.company_name, "Acme");
    }

    #[tokio::test]
    async fn lookup_error_degrades_too() {
        let backend = MemoryBackend::new();
        let identity = backend
            .sign_up_as("cy@acme.io", "Cy", Some("Acme"), None)
            .await;
        backend.set_fail_reads(true);

        let resolution = resolver(&backend).resolve(&identity).await;
        assert!(resolution.is_degraded());
        assert_eq!(resolution.profile().unwrap().company_id, CompanyId::Temp);
    }

    #[tokio::test]
    async fn bare_identity_falls_back_to_email_and_default_company() {
        let backend = MemoryBackend::new();
        let identity = Identity {
            id: Uuid::now_v7(),
            email: "ghost@nowhere.io".to_string(),
            metadata: Default::default(),
        };

        let profile = resolver(&backend).resolve(&identity).await.into_profile().unwrap();
        assert_eq!(profile.name, "ghost@nowhere.io");
        assert_eq!(profile.company_name, DEFAULT_COMPANY);
        assert_eq!(profile.role, Role::Member);
    }

    #[test]
    fn partial_row_fills_gaps() {
        let identity = Identity {
            id: Uuid::now_v7(),
            email: "dee@acme.io".to_string(),
            metadata: Default::default(),
        };
        let row = ProfileRow {
            id: identity.id,
            name: None,
            company_id: None,
            role: None,
            company_name: None,
        };

        let profile = from_row(&identity, row);
        assert_eq!(profile.name, "dee@acme.io");
        assert_eq!(profile.company_id, CompanyId::Temp);
        assert_eq!(profile.company_name, UNKNOWN_COMPANY);
        assert_eq!(profile.role, Role::Member);
    }

    #[tokio::test]
    async fn no_identity_is_absent() {
        let backend = MemoryBackend::new();
        assert_eq!(resolver(&backend).resolve_current().await, Resolution::Absent);
    }
}
