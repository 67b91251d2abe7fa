use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::models::{
    Identity, NewProject, NewTask, ProfileRow, Project, ProjectChanges, Task, TaskChanges,
};
use crate::routes::auth::{AuthResponse, LoginRequest, SignupRequest};
use crate::routes::company::{CompanyResponse, CountResponse};
use crate::tracker::error::{TrackerError, TrackerResult};
use crate::tracker::identity::{AuthChange, AuthEvent, IdentityStore, SignupMetadata};
use crate::tracker::store::TenantStore;

const EVENT_CAPACITY: usize = 32;

struct Session {
    access_token: String,
    refresh_token: String,
}

/// Identity and tenant store backed by the teamtrack HTTP API.
///
/// Holds the session tokens in memory and broadcasts every session change.
/// A request rejected with 401 renews the access token once and is retried;
/// when the refresh token is rejected too the session ends with `SignedOut`.
pub struct HttpBackend {
    client: Client,
    base_url: String,
    session: RwLock<Option<Session>>,
    events: broadcast::Sender<AuthChange>,
    /// Serializes token rotation; refresh tokens are single use.
    refreshing: Mutex<()>,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(Client::new(), &config.api_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session: RwLock::new(None),
            events,
            refreshing: Mutex::new(()),
        }
    }

    /// Exchange the refresh token for a new token pair.
    ///
    /// Emits `TokenRefreshed` on success. A rejected refresh token ends the
    /// session and emits `SignedOut`.
    pub async fn refresh_session(&self) -> TrackerResult<Identity> {
        let _rotating = self.refreshing.lock().await;
        self.rotate().await
    }

    async fn rotate(&self) -> TrackerResult<Identity> {
        let refresh_token = self
            .read_session()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .ok_or(TrackerError::Unauthenticated)?;

        let resp = self
            .client
            .post(self.url("/auth/refresh"))
            .header("cookie", format!("refresh_token={refresh_token}"))
            .send()
            .await?;

        match read_json::<AuthResponse>(resp).await {
            Ok(auth) => Ok(self.start_session(auth, AuthEvent::TokenRefreshed)),
            // Transport and server failures leave the session for a later retry.
            Err(TrackerError::Backend(msg)) => Err(TrackerError::Backend(msg)),
            Err(e) => {
                tracing::warn!("Refresh token rejected ({e}), ending session");
                self.end_session();
                Err(TrackerError::Unauthenticated)
            }
        }
    }

    /// Renew the session after `stale` was rejected. Callers that lost the
    /// race to the lock pick up the token the winner obtained.
    async fn renew_after(&self, stale: &str) -> TrackerResult<String> {
        let _rotating = self.refreshing.lock().await;
        match self.access_token() {
            None => return Err(TrackerError::Unauthenticated),
            Some(current) if current != stale => return Ok(current),
            Some(_) => {}
        }
        tracing::debug!("Access token rejected, refreshing");
        self.rotate().await?;
        self.access_token().ok_or(TrackerError::Unauthenticated)
    }

    /// Send a request with the session's bearer token, renewing it once if
    /// the server rejects it.
    async fn send_authed<F>(&self, build: F) -> TrackerResult<Response>
    where
        F: Fn(&Client) -> RequestBuilder + Send + Sync,
    {
        let token = self.access_token().ok_or(TrackerError::Unauthenticated)?;
        let resp = build(&self.client).bearer_auth(&token).send().await?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        let token = self.renew_after(&token).await?;
        Ok(build(&self.client).bearer_auth(token).send().await?)
    }

    /// The caller's company. The join code is only present for admins.
    pub async fn company(&self) -> TrackerResult<CompanyResponse> {
        let resp = self.send_authed(|c| c.get(self.url("/company"))).await?;
        read_json(resp).await
    }

    pub fn access_token(&self) -> Option<String> {
        self.read_session().as_ref().map(|s| s.access_token.clone())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    fn start_session(&self, auth: AuthResponse, event: AuthEvent) -> Identity {
        *self.write_session() = Some(Session {
            access_token: auth.access_token,
            refresh_token: auth.refresh_token,
        });
        self.emit(event, Some(auth.user.clone()));
        auth.user
    }

    /// Drops the local session. Returns the refresh token it held.
    fn end_session(&self) -> Option<String> {
        let previous = self.write_session().take();
        self.emit(AuthEvent::SignedOut, None);
        previous.map(|s| s.refresh_token)
    }

    fn emit(&self, event: AuthEvent, session: Option<Identity>) {
        tracing::debug!("Auth event {event:?}");
        // No subscribers is fine.
        let _ = self.events.send(AuthChange { event, session });
    }

    fn read_session(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_session(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IdentityStore for HttpBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignupMetadata,
    ) -> TrackerResult<Identity> {
        let body = SignupRequest {
            email: email.to_string(),
            password: password.to_string(),
            name: metadata.name.clone(),
            company_name: metadata.company_name.clone(),
            company_code: metadata.company_code.clone(),
        };

        let resp = self
            .client
            .post(self.url("/auth/signup"))
            .json(&body)
            .send()
            .await?;

        let auth: AuthResponse = read_json(resp).await?;
        Ok(self.start_session(auth, AuthEvent::SignedIn))
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> TrackerResult<Identity> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let resp = self
            .client
            .post(self.url("/auth/login"))
            .json(&body)
            .send()
            .await?;

        let auth: AuthResponse = read_json(resp).await?;
        Ok(self.start_session(auth, AuthEvent::SignedIn))
    }

    async fn sign_out(&self) -> TrackerResult<()> {
        let Some(refresh_token) = self.end_session() else {
            return Ok(());
        };

        let resp = self
            .client
            .post(self.url("/auth/logout"))
            .header("cookie", format!("refresh_token={refresh_token}"))
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(error_from(resp).await);
        }
        Ok(())
    }

    async fn get_user(&self) -> TrackerResult<Option<Identity>> {
        let resp = match self.send_authed(|c| c.get(self.url("/auth/user"))).await {
            Ok(resp) => resp,
            Err(TrackerError::Unauthenticated) => return Ok(None),
            Err(e) => return Err(e),
        };

        match read_json::<Identity>(resp).await {
            Ok(identity) => Ok(Some(identity)),
            Err(TrackerError::Unauthenticated) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl TenantStore for HttpBackend {
    async fn fetch_profile(&self, id: Uuid) -> TrackerResult<Option<ProfileRow>> {
        let resp = self
            .send_authed(|c| c.get(self.url(&format!("/profiles/{id}"))))
            .await?;
        read_json(resp).await
    }

    async fn count_profiles(&self, company_id: Uuid) -> TrackerResult<i64> {
        let resp = self
            .send_authed(|c| c.get(self.url(&format!("/companies/{company_id}/members/count"))))
            .await?;
        let body: CountResponse = read_json(resp).await?;
        Ok(body.count)
    }

    async fn list_projects(&self) -> TrackerResult<Vec<Project>> {
        let resp = self.send_authed(|c| c.get(self.url("/projects"))).await?;
        read_json(resp).await
    }

    async fn insert_project(&self, project: &NewProject) -> TrackerResult<Project> {
        let resp = self
            .send_authed(|c| c.post(self.url("/projects")).json(project))
            .await?;
        read_json(resp).await
    }

    async fn update_project(&self, id: Uuid, changes: &ProjectChanges) -> TrackerResult<Project> {
        let resp = self
            .send_authed(|c| c.put(self.url(&format!("/projects/{id}"))).json(changes))
            .await?;
        read_json(resp).await
    }

    async fn delete_project(&self, id: Uuid) -> TrackerResult<()> {
        let resp = self
            .send_authed(|c| c.delete(self.url(&format!("/projects/{id}"))))
            .await?;
        expect_success(resp).await
    }

    async fn list_tasks(&self) -> TrackerResult<Vec<Task>> {
        let resp = self.send_authed(|c| c.get(self.url("/tasks"))).await?;
        read_json(resp).await
    }

    async fn insert_task(&self, task: &NewTask) -> TrackerResult<Task> {
        let resp = self
            .send_authed(|c| c.post(self.url("/tasks")).json(task))
            .await?;
        read_json(resp).await
    }

    async fn update_task(&self, id: Uuid, changes: &TaskChanges) -> TrackerResult<Task> {
        let resp = self
            .send_authed(|c| c.put(self.url(&format!("/tasks/{id}"))).json(changes))
            .await?;
        read_json(resp).await
    }

    async fn delete_task(&self, id: Uuid) -> TrackerResult<()> {
        let resp = self
            .send_authed(|c| c.delete(self.url(&format!("/tasks/{id}"))))
            .await?;
        expect_success(resp).await
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> TrackerResult<T> {
    if !resp.status().is_success() {
        return Err(error_from(resp).await);
    }
    Ok(resp.json().await?)
}

async fn expect_success(resp: Response) -> TrackerResult<()> {
    if !resp.status().is_success() {
        return Err(error_from(resp).await);
    }
    Ok(())
}

async fn error_from(resp: Response) -> TrackerError {
    let status = resp.status();
    let message = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| body["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| status.to_string());

    error_for_status(status, message)
}

fn error_for_status(status: StatusCode, message: String) -> TrackerError {
    match status {
        StatusCode::UNAUTHORIZED => TrackerError::Unauthenticated,
        StatusCode::PRECONDITION_FAILED => TrackerError::ProfileMissing,
        StatusCode::CONFLICT => TrackerError::AlreadyExists,
        StatusCode::NOT_FOUND => TrackerError::NotFound(message),
        StatusCode::BAD_REQUEST => TrackerError::InvalidInput(message),
        StatusCode::FORBIDDEN => TrackerError::Forbidden(message),
        _ => TrackerError::Backend(message),
    }
}
