//! In-memory identity and tenant store for unit tests.
//!
//! Applies the same company row policy as the service: every call runs as the
//! signed-in identity and only sees that identity's company.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    Company, Identity, NewProject, NewTask, ProfileRow, Project, ProjectChanges, Role, Task,
    TaskChanges,
};
use crate::tracker::error::{TrackerError, TrackerResult};
use crate::tracker::identity::{AuthChange, AuthEvent, IdentityStore, SignupMetadata};
use crate::tracker::store::TenantStore;

pub const PASSWORD: &str = "correct-horse-battery";

struct Account {
    identity: Identity,
    password: String,
}

struct StoredProfile {
    id: Uuid,
    name: String,
    company_id: Uuid,
    role: Role,
}

#[derive(Default)]
struct Inner {
    accounts: Vec<Account>,
    companies: Vec<Company>,
    profiles: Vec<StoredProfile>,
    projects: Vec<Project>,
    tasks: Vec<Task>,
    current: Option<Uuid>,
    skip_profiles: bool,
    fail_reads: bool,
    read_delay: Duration,
    ticks: i64,
}

impl Inner {
    /// Strictly increasing timestamps so listings have a stable order.
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        DateTime::from_timestamp(1_700_000_000 + self.ticks, 0).unwrap_or_default()
    }

    fn current_identity(&self) -> Option<&Identity> {
        let id = self.current?;
        self.accounts
            .iter()
            .find(|a| a.identity.id == id)
            .map(|a| &a.identity)
    }

    /// Company of the signed-in identity.
    fn caller_company(&self) -> TrackerResult<Uuid> {
        let id = self.current.ok_or(TrackerError::Unauthenticated)?;
        self.profiles
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.company_id)
            .ok_or(TrackerError::ProfileMissing)
    }

    fn check_reads(&self) -> TrackerResult<()> {
        if self.fail_reads {
            return Err(TrackerError::Backend("connection reset".to_string()));
        }
        Ok(())
    }

    fn project_name(&self, id: Uuid) -> Option<String> {
        self.projects
            .iter()
            .find(|p| p.id == id)
            .map(|p| p.name.clone())
    }
}

pub struct MemoryBackend {
    inner: Mutex<Inner>,
    events: broadcast::Sender<AuthChange>,
    profile_fetches: AtomicUsize,
}

impl MemoryBackend {
    pub fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            events,
            profile_fetches: AtomicUsize::new(0),
        })
    }

    /// Sign up with [`PASSWORD`] and stay signed in.
    pub async fn sign_up_as(
        &self,
        email: &str,
        name: &str,
        company_name: Option<&str>,
        company_code: Option<&str>,
    ) -> Identity {
        let metadata = SignupMetadata {
            name: name.to_string(),
            company_name: company_name.map(str::to_string),
            company_code: company_code.map(str::to_string),
        };
        self.sign_up(email, PASSWORD, &metadata)
            .await
            .expect("memory signup")
    }

    /// Signups stop creating profile rows.
    pub fn set_skip_profiles(&self, skip: bool) {
        self.lock().skip_profiles = skip;
    }

    /// Every read fails with a backend error.
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Project listings stall for `delay` before answering.
    pub fn set_read_delay(&self, delay: Duration) {
        self.lock().read_delay = delay;
    }

    pub fn profile_fetches(&self) -> usize {
        self.profile_fetches.load(Ordering::SeqCst)
    }

    pub fn join_code(&self, company_name: &str) -> Option<String> {
        self.lock()
            .companies
            .iter()
            .find(|c| c.name == company_name)
            .map(|c| c.join_code.clone())
    }

    /// Broadcast a token refresh for the current session.
    pub fn refresh_token(&self) {
        let session = self.lock().current_identity().cloned();
        let _ = self.events.send(AuthChange {
            event: AuthEvent::TokenRefreshed,
            session,
        });
    }

    pub fn emit(&self, change: AuthChange) {
        let _ = self.events.send(change);
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl IdentityStore for MemoryBackend {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &SignupMetadata,
    ) -> TrackerResult<Identity> {
        let identity = {
            let mut inner = self.lock();
            if inner.accounts.iter().any(|a| a.identity.email == email) {
                return Err(TrackerError::AlreadyExists);
            }

            let (company_id, role) = match (&metadata.company_name, &metadata.company_code) {
                (Some(name), _) => {
                    let created_at = inner.now();
                    let company = Company {
                        id: Uuid::now_v7(),
                        name: name.clone(),
                        join_code: format!("JOIN{:04}", inner.companies.len() + 1),
                        created_at,
                    };
                    let id = company.id;
                    inner.companies.push(company);
                    (id, Role::Admin)
                }
                (None, Some(code)) => {
                    let company = inner
                        .companies
                        .iter()
                        .find(|c| &c.join_code == code)
                        .ok_or_else(|| {
                            TrackerError::InvalidInput("Invalid company code".to_string())
                        })?;
                    (company.id, Role::Member)
                }
                (None, None) => {
                    return Err(TrackerError::InvalidInput(
                        "Company name or join code required".to_string(),
                    ));
                }
            };

            let identity = Identity {
                id: Uuid::now_v7(),
                email: email.to_string(),
                metadata: metadata.identity_metadata(),
            };
            if !inner.skip_profiles {
                inner.profiles.push(StoredProfile {
                    id: identity.id,
                    name: metadata.name.clone(),
                    company_id,
                    role,
                });
            }
            inner.accounts.push(Account {
                identity: identity.clone(),
                password: password.to_string(),
            });
            inner.current = Some(identity.id);
            identity
        };

        self.emit(AuthChange {
            event: AuthEvent::SignedIn,
            session: Some(identity.clone()),
        });
        Ok(identity)
    }

    async fn sign_in_with_password(&self, email: &str, password: &str) -> TrackerResult<Identity> {
        let identity = {
            let mut inner = self.lock();
            let identity = inner
                .accounts
                .iter()
                .find(|a| a.identity.email == email && a.password == password)
                .map(|a| a.identity.clone())
                .ok_or(TrackerError::Unauthenticated)?;
            inner.current = Some(identity.id);
            identity
        };

        self.emit(AuthChange {
            event: AuthEvent::SignedIn,
            session: Some(identity.clone()),
        });
        Ok(identity)
    }

    async fn sign_out(&self) -> TrackerResult<()> {
        self.lock().current = None;
        self.emit(AuthChange {
            event: AuthEvent::SignedOut,
            session: None,
        });
        Ok(())
    }

    async fn get_user(&self) -> TrackerResult<Option<Identity>> {
        Ok(self.lock().current_identity().cloned())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthChange> {
        self.events.subscribe()
    }
}

#[async_trait]
impl TenantStore for MemoryBackend {
    async fn fetch_profile(&self, id: Uuid) -> TrackerResult<Option<ProfileRow>> {
        self.profile_fetches.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        inner.check_reads()?;

        Ok(inner.profiles.iter().find(|p| p.id == id).map(|p| {
            let company = inner.companies.iter().find(|c| c.id == p.company_id);
            ProfileRow {
                id: p.id,
                name: Some(p.name.clone()),
                company_id: Some(p.company_id),
                role: Some(p.role),
                company_name: company.map(|c| c.name.clone()),
            }
        }))
    }

    async fn count_profiles(&self, company_id: Uuid) -> TrackerResult<i64> {
        let inner = self.lock();
        inner.check_reads()?;
        if inner.caller_company()? != company_id {
            return Err(TrackerError::Forbidden("Not your company".to_string()));
        }
        Ok(inner
            .profiles
            .iter()
            .filter(|p| p.company_id == company_id)
            .count() as i64)
    }

    async fn list_projects(&self) -> TrackerResult<Vec<Project>> {
        let delay = self.lock().read_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let inner = self.lock();
        inner.check_reads()?;
        let company_id = inner.caller_company()?;

        let mut projects: Vec<Project> = inner
            .projects
            .iter()
            .filter(|p| p.company_id == company_id)
            .cloned()
            .collect();
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn insert_project(&self, project: &NewProject) -> TrackerResult<Project> {
        let mut inner = self.lock();
        if inner.caller_company()? != project.company_id {
            return Err(TrackerError::Forbidden(
                "Row violates company policy".to_string(),
            ));
        }

        let created_at = inner.now();
        let project = Project {
            id: Uuid::now_v7(),
            name: project.name.clone(),
            description: project.description.clone(),
            company_id: project.company_id,
            created_at,
        };
        inner.projects.push(project.clone());
        Ok(project)
    }

    async fn update_project(&self, id: Uuid, changes: &ProjectChanges) -> TrackerResult<Project> {
        let mut inner = self.lock();
        let company_id = inner.caller_company()?;
        let project = inner
            .projects
            .iter_mut()
            .find(|p| p.id == id && p.company_id == company_id)
            .ok_or_else(|| TrackerError::NotFound("Project not found".to_string()))?;

        if let Some(name) = &changes.name {
            project.name = name.clone();
        }
        if let Some(description) = &changes.description {
            project.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        let project = project.clone();

        for task in inner.tasks.iter_mut().filter(|t| t.project_id == id) {
            task.project_name = Some(project.name.clone());
        }
        Ok(project)
    }

    async fn delete_project(&self, id: Uuid) -> TrackerResult<()> {
        let mut inner = self.lock();
        let company_id = inner.caller_company()?;
        let before = inner.projects.len();
        inner
            .projects
            .retain(|p| !(p.id == id && p.company_id == company_id));
        if inner.projects.len() == before {
            return Err(TrackerError::NotFound("Project not found".to_string()));
        }
        inner.tasks.retain(|t| t.project_id != id);
        Ok(())
    }

    async fn list_tasks(&self) -> TrackerResult<Vec<Task>> {
        let inner = self.lock();
        inner.check_reads()?;
        let company_id = inner.caller_company()?;

        let mut tasks: Vec<Task> = inner
            .tasks
            .iter()
            .filter(|t| t.company_id == company_id)
            .cloned()
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    async fn insert_task(&self, task: &NewTask) -> TrackerResult<Task> {
        let mut inner = self.lock();
        let company_id = inner.caller_company()?;
        if company_id != task.company_id {
            return Err(TrackerError::Forbidden(
                "Row violates company policy".to_string(),
            ));
        }
        if !inner
            .projects
            .iter()
            .any(|p| p.id == task.project_id && p.company_id == company_id)
        {
            return Err(TrackerError::NotFound("Project not found".to_string()));
        }

        let created_at = inner.now();
        let task = Task {
            id: Uuid::now_v7(),
            title: task.title.clone(),
            description: task.description.clone(),
            status: task.status,
            project_id: task.project_id,
            assigned_user_id: Some(task.assigned_user_id),
            company_id,
            created_at,
            project_name: inner.project_name(task.project_id),
        };
        inner.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: Uuid, changes: &TaskChanges) -> TrackerResult<Task> {
        let mut inner = self.lock();
        let company_id = inner.caller_company()?;
        let project_name = changes.project_id.and_then(|p| inner.project_name(p));
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == id && t.company_id == company_id)
            .ok_or_else(|| TrackerError::NotFound("Task not found".to_string()))?;

        if let Some(title) = &changes.title {
            task.title = title.clone();
        }
        if let Some(description) = &changes.description {
            task.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        if let Some(status) = changes.status {
            task.status = status;
        }
        if let Some(project_id) = changes.project_id {
            task.project_id = project_id;
            task.project_name = project_name;
        }
        if let Some(assignee) = changes.assigned_user_id {
            task.assigned_user_id = Some(assignee);
        }
        Ok(task.clone())
    }

    async fn delete_task(&self, id: Uuid) -> TrackerResult<()> {
        let mut inner = self.lock();
        let company_id = inner.caller_company()?;
        let before = inner.tasks.len();
        inner
            .tasks
            .retain(|t| !(t.id == id && t.company_id == company_id));
        if inner.tasks.len() == before {
            return Err(TrackerError::NotFound("Task not found".to_string()));
        }
        Ok(())
    }
}
