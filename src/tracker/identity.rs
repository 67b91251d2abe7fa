use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::models::{Identity, IdentityMetadata};
use crate::tracker::error::TrackerResult;

/// Kind of change reported by the identity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
}

/// An auth state change. `session` is present while authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChange {
    pub event: AuthEvent,
    pub session: Option<Identity>,
}

/// Authentication provider boundary.
///
/// Implementations own the session token and broadcast every state change to
/// subscribers, including changes that happen without an explicit call (token
/// refresh).
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignupMetadata,
    ) -> TrackerResult<Identity>;

    async fn sign_in_with_password(&self, email: &str, password: &str) -> TrackerResult<Identity>;

    async fn sign_out(&self) -> TrackerResult<()>;

    /// The identity behind the current session, if any.
    async fn get_user(&self) -> TrackerResult<Option<Identity>>;

    fn subscribe(&self) -> broadcast::Receiver<AuthChange>;
}

/// Everything signup sends along with the credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupMetadata {
    pub name: String,
    pub company_name: Option<String>,
    pub company_code: Option<String>,
}

impl SignupMetadata {
    pub fn identity_metadata(&self) -> IdentityMetadata {
        IdentityMetadata {
            name: Some(self.name.clone()),
            company_name: self.company_name.clone(),
        }
    }
}
