//! Authenticated session state.
//!
//! The manager resolves the current identity once at startup, then follows the
//! identity store's change stream. Events carrying a session schedule a
//! debounced profile resolution; a newer event replaces the pending one, so a
//! burst of events resolves the profile once. State is published on a watch
//! channel that dependents (the data cache) subscribe to.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::models::{Identity, Profile};
use crate::tracker::error::{TrackerError, TrackerResult};
use crate::tracker::identity::{AuthChange, AuthEvent, IdentityStore, SignupMetadata};
use crate::tracker::profile::{ProfileResolver, Resolution};
use crate::tracker::store::TenantStore;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing resolved yet.
    #[default]
    Unknown,
    /// A session exists and its profile is being resolved.
    Authenticating,
    Authenticated(Profile),
    Anonymous,
}

impl SessionState {
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            SessionState::Authenticated(profile) => Some(profile),
            _ => None,
        }
    }

    /// Authenticated or anonymous.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            SessionState::Authenticated(_) | SessionState::Anonymous
        )
    }
}

/// Debounced resolution in flight. `epoch` changes whenever it is superseded
/// or cancelled; a resolution only publishes if the epoch it started with is
/// still current.
#[derive(Default)]
struct Pending {
    epoch: u64,
    handle: Option<JoinHandle<()>>,
}

pub struct SessionManager {
    identity: Arc<dyn IdentityStore>,
    resolver: ProfileResolver,
    debounce: Duration,
    state: watch::Sender<SessionState>,
    closed: watch::Sender<bool>,
    pending: Mutex<Pending>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl SessionManager {
    pub fn new(
        identity: Arc<dyn IdentityStore>,
        store: Arc<dyn TenantStore>,
        config: &ClientConfig,
    ) -> Arc<Self> {
        Self::with_debounce(identity, store, config.auth_debounce)
    }

    pub fn with_debounce(
        identity: Arc<dyn IdentityStore>,
        store: Arc<dyn TenantStore>,
        debounce: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            resolver: ProfileResolver::new(identity.clone(), store),
            identity,
            debounce,
            state: watch::Sender::new(SessionState::Unknown),
            closed: watch::Sender::new(false),
            pending: Mutex::new(Pending::default()),
            listener: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn profile(&self) -> Option<Profile> {
        self.state.borrow().profile().cloned()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve the current identity and start following auth changes.
    pub async fn start(self: &Arc<Self>) {
        // Subscribe first so nothing emitted during the initial resolve is lost.
        let events = self.identity.subscribe();

        let initial = match self.resolver.resolve_current().await {
            Resolution::Absent => SessionState::Anonymous,
            resolution => {
                if resolution.is_degraded() {
                    tracing::warn!("Starting with a degraded profile");
                }
                resolution
                    .into_profile()
                    .map_or(SessionState::Anonymous, SessionState::Authenticated)
            }
        };
        if self.is_shut_down() {
            return;
        }
        // Only replace Unknown; an event may already have moved the state on.
        self.state.send_if_modified(|state| {
            if *state == SessionState::Unknown {
                *state = initial;
                true
            } else {
                false
            }
        });

        let handle = tokio::spawn(listen(Arc::downgrade(self), events, self.closed.subscribe()));
        if let Some(previous) = lock(&self.listener).replace(handle) {
            previous.abort();
        }
        tracing::info!("Session manager started");
    }

    /// State is left as is on failure.
    pub async fn login(&self, email: &str, password: &str) -> TrackerResult<Identity> {
        match self.identity.sign_in_with_password(email, password).await {
            Ok(identity) => {
                tracing::info!("Signed in as {}", identity.email);
                Ok(identity)
            }
            Err(e) => {
                tracing::warn!("Login failed for {email}: {e}");
                Err(e)
            }
        }
    }

    /// Either create a company (the caller becomes its admin) or join one by
    /// code; exactly one of the two must be given.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: &str,
        company_name: Option<&str>,
        company_code: Option<&str>,
    ) -> TrackerResult<Identity> {
        let company_name = non_blank(company_name);
        let company_code = non_blank(company_code);
        if company_name.is_some() == company_code.is_some() {
            return Err(TrackerError::InvalidInput(
                "Provide either a company name or a company code".to_string(),
            ));
        }
        if name.trim().is_empty() {
            return Err(TrackerError::InvalidInput("Name is required".to_string()));
        }

        let metadata = SignupMetadata {
            name: name.trim().to_string(),
            company_name,
            company_code,
        };
        match self.identity.sign_up(email, password, &metadata).await {
            Ok(identity) => {
                tracing::info!("Signed up {}", identity.email);
                Ok(identity)
            }
            Err(TrackerError::AlreadyExists) => {
                tracing::info!("Signup for {email} collided with an existing account");
                Err(TrackerError::AlreadyExists)
            }
            Err(e) => {
                tracing::error!("Signup failed for {email}: {e}");
                Err(e)
            }
        }
    }

    /// Ends the session. Local state is anonymous once this returns, even if
    /// revoking the session remotely failed.
    pub async fn logout(&self) -> TrackerResult<()> {
        let result = self.identity.sign_out().await;
        self.settle(SessionState::Anonymous);
        if let Err(e) = &result {
            tracing::warn!("Sign out failed: {e}");
        }
        result
    }

    /// Wait until `f` holds for the published state.
    pub async fn wait_for(&self, f: impl FnMut(&SessionState) -> bool) -> SessionState {
        let mut rx = self.state.subscribe();
        let result = rx.wait_for(f).await.map(|state| state.clone());
        result.unwrap_or_else(|_| self.current())
    }

    /// Stop following auth changes. Nothing is published afterwards.
    pub fn shutdown(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        {
            let mut pending = lock(&self.pending);
            pending.epoch += 1;
            if let Some(handle) = pending.handle.take() {
                handle.abort();
            }
        }
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
        tracing::debug!("Session manager shut down");
    }

    fn on_auth_change(self: &Arc<Self>, change: AuthChange) {
        if self.is_shut_down() {
            return;
        }
        tracing::debug!("Auth change {:?}", change.event);

        match change.session {
            Some(identity) => {
                // Keep an established profile visible while re-resolving.
                self.state.send_if_modified(|state| {
                    if state.profile().is_none() {
                        *state = SessionState::Authenticating;
                        true
                    } else {
                        false
                    }
                });
                self.schedule_resolve(identity);
            }
            None => self.settle(SessionState::Anonymous),
        }
    }

    fn schedule_resolve(self: &Arc<Self>, identity: Identity) {
        let mut pending = lock(&self.pending);
        pending.epoch += 1;
        if let Some(previous) = pending.handle.take() {
            previous.abort();
        }

        let epoch = pending.epoch;
        let this = self.clone();
        pending.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(this.debounce).await;
            let resolution = this.resolver.resolve(&identity).await;
            let Some(profile) = resolution.into_profile() else {
                return;
            };
            this.publish(epoch, SessionState::Authenticated(profile));
        }));
    }

    /// Publish a resolution unless it was superseded or the manager shut down.
    fn publish(&self, epoch: u64, next: SessionState) {
        let mut pending = lock(&self.pending);
        if pending.epoch != epoch || self.is_shut_down() {
            tracing::debug!("Discarding stale profile resolution");
            return;
        }
        pending.handle = None;
        self.state.send_if_modified(|state| replace_if_changed(state, next));
    }

    /// Cancel any pending resolution and publish `next` right away.
    fn settle(&self, next: SessionState) {
        let mut pending = lock(&self.pending);
        pending.epoch += 1;
        if let Some(handle) = pending.handle.take() {
            handle.abort();
        }
        if self.is_shut_down() {
            return;
        }
        self.state.send_if_modified(|state| replace_if_changed(state, next));
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn listen(
    manager: Weak<SessionManager>,
    mut events: tokio::sync::broadcast::Receiver<AuthChange>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        let received = tokio::select! {
            _ = closed.wait_for(|closed| *closed) => break,
            received = events.recv() => received,
        };
        let Some(manager) = manager.upgrade() else { break };
        match received {
            Ok(change) => manager.on_auth_change(change),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!("Missed {skipped} auth events, re-resolving");
                match manager.identity.get_user().await {
                    Ok(session) => manager.on_auth_change(AuthChange {
                        event: AuthEvent::UserUpdated,
                        session,
                    }),
                    Err(e) => tracing::warn!("Could not read current identity: {e}"),
                }
            }
            Err(RecvError::Closed) => break,
        }
    }
    tracing::debug!("Auth listener stopped");
}

fn replace_if_changed(state: &mut SessionState, next: SessionState) -> bool {
    if *state == next {
        return false;
    }
    *state = next;
    true
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
