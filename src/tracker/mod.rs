//! Client-side tracker core.
//!
//! Talks to the service through the [`IdentityStore`] and [`TenantStore`]
//! boundaries ([`HttpBackend`] implements both), keeps the authenticated
//! session in a [`SessionManager`] and mirrors the company's data in a
//! [`DataCache`].

pub mod cache;
pub mod error;
pub mod gateway;
pub mod http;
pub mod identity;
pub mod profile;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheSnapshot, DataCache, Stats, StatusBreakdown};
pub use error::{TrackerError, TrackerResult};
pub use gateway::TenantGateway;
pub use http::HttpBackend;
pub use identity::{AuthChange, AuthEvent, IdentityStore, SignupMetadata};
pub use profile::{ProfileResolver, Resolution};
pub use session::{SessionManager, SessionState};
pub use store::TenantStore;

use std::sync::Arc;

use crate::config::ClientConfig;

/// The tracker core wired against the HTTP API.
pub struct Tracker {
    pub backend: Arc<HttpBackend>,
    pub session: Arc<SessionManager>,
    pub gateway: TenantGateway,
    pub cache: Arc<DataCache>,
}

impl Tracker {
    /// Build the components, resolve the current session and start following
    /// auth changes.
    pub async fn start(config: &ClientConfig) -> Self {
        let backend = Arc::new(HttpBackend::new(config));
        let session = SessionManager::new(backend.clone(), backend.clone(), config);
        let gateway = TenantGateway::new(backend.clone(), backend.clone());
        let cache = DataCache::new(gateway.clone());

        session.start().await;
        cache.attach(&session);

        Self {
            backend,
            session,
            gateway,
            cache,
        }
    }

    pub fn shutdown(&self) {
        self.cache.shutdown();
        self.session.shutdown();
    }
}
