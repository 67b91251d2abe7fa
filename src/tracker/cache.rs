//! Local mirror of the active company's projects and tasks.
//!
//! Reads come from the last successful refresh. Mutations go through the
//! gateway and apply the returned row to the mirror, so the UI never waits for
//! a full reload after a write.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures_util::future;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::{
    CompanyId, Profile, Project, ProjectChanges, ProjectInput, Task, TaskChanges, TaskInput,
    TaskStatus,
};
use crate::tracker::error::TrackerResult;
use crate::tracker::gateway::TenantGateway;
use crate::tracker::session::{SessionManager, SessionState};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Profile the collections were loaded for.
    pub profile_id: Option<Uuid>,
    pub projects: Vec<Project>,
    pub tasks: Vec<Task>,
    pub total_users: i64,
    pub is_loading: bool,
    /// Notice from the last failed load, cleared by the next good one.
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total_users: i64,
    pub total_projects: usize,
    pub total_tasks: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusBreakdown {
    pub todo: usize,
    pub in_progress: usize,
    pub done: usize,
}

/// Identifies the tenant a refresh was made for.
type ProfileKey = (Uuid, CompanyId);

fn key_of(profile: &Profile) -> ProfileKey {
    (profile.id, profile.company_id)
}

pub struct DataCache {
    gateway: TenantGateway,
    profile: Mutex<Option<Profile>>,
    snapshot: watch::Sender<CacheSnapshot>,
    /// Refreshes in flight; `is_loading` holds while this is non-zero.
    loads: AtomicUsize,
    closed: watch::Sender<bool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl DataCache {
    pub fn new(gateway: TenantGateway) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            profile: Mutex::new(None),
            snapshot: watch::Sender::new(CacheSnapshot::default()),
            loads: AtomicUsize::new(0),
            closed: watch::Sender::new(false),
            listener: Mutex::new(None),
        })
    }

    pub fn subscribe(&self) -> watch::Receiver<CacheSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn projects(&self) -> Vec<Project> {
        self.snapshot.borrow().projects.clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.snapshot.borrow().tasks.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.snapshot.borrow().is_loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.snapshot.borrow().last_error.clone()
    }

    pub fn stats(&self) -> Stats {
        let snapshot = self.snapshot.borrow();
        Stats {
            total_users: snapshot.total_users,
            total_projects: snapshot.projects.len(),
            total_tasks: snapshot.tasks.len(),
        }
    }

    pub fn status_breakdown(&self) -> StatusBreakdown {
        let snapshot = self.snapshot.borrow();
        let count = |status: TaskStatus| {
            snapshot.tasks.iter().filter(|t| t.status == status).count()
        };
        StatusBreakdown {
            todo: count(TaskStatus::Todo),
            in_progress: count(TaskStatus::InProgress),
            done: count(TaskStatus::Done),
        }
    }

    pub fn recent_projects(&self, n: usize) -> Vec<Project> {
        self.snapshot.borrow().projects.iter().take(n).cloned().collect()
    }

    pub fn recent_tasks(&self, n: usize) -> Vec<Task> {
        self.snapshot.borrow().tasks.iter().take(n).cloned().collect()
    }

    /// Tasks grouped into board columns, in board order.
    pub fn tasks_by_status(&self) -> Vec<(TaskStatus, Vec<Task>)> {
        let snapshot = self.snapshot.borrow();
        TaskStatus::ALL
            .iter()
            .map(|status| {
                let column = snapshot
                    .tasks
                    .iter()
                    .filter(|t| t.status == *status)
                    .cloned()
                    .collect();
                (*status, column)
            })
            .collect()
    }

    /// Refresh once for every distinct profile the session settles on. Logging
    /// out clears the mirror.
    pub fn attach(self: &Arc<Self>, session: &SessionManager) {
        let handle = tokio::spawn(follow(
            Arc::downgrade(self),
            session.subscribe(),
            self.closed.subscribe(),
        ));
        if let Some(previous) = lock(&self.listener).replace(handle) {
            previous.abort();
        }
    }

    /// Use `profile` for the next refresh without going through a session.
    pub fn set_profile(&self, profile: Option<Profile>) {
        *lock(&self.profile) = profile;
    }

    /// Reload projects, tasks and the member count concurrently.
    ///
    /// A failed load keeps the previous collections and records a notice; a
    /// failed count keeps the previous count. With no profile the mirror is
    /// cleared.
    pub async fn refresh(&self) -> TrackerResult<()> {
        let Some(profile) = self.current_profile() else {
            self.update(|snapshot| *snapshot = CacheSnapshot::default());
            return Ok(());
        };
        let key = key_of(&profile);

        let load = Loading::start(self);

        let (lists, count) = future::join(
            future::try_join(self.gateway.list_projects(), self.gateway.list_tasks()),
            self.gateway.count_members(&profile.company_id),
        )
        .await;

        if self.current_profile().as_ref().map(key_of) != Some(key) {
            tracing::debug!("Profile changed during refresh, discarding results");
            return Ok(());
        }

        let result = lists.as_ref().map(|_| ()).map_err(|e| e.clone());
        self.update(|snapshot| {
            if snapshot.profile_id != Some(profile.id) {
                // Never show one profile's rows to another, even stale.
                snapshot.projects.clear();
                snapshot.tasks.clear();
                snapshot.total_users = 0;
                snapshot.profile_id = Some(profile.id);
            }
            match lists {
                Ok((projects, tasks)) => {
                    tracing::debug!(
                        "Loaded {} projects and {} tasks",
                        projects.len(),
                        tasks.len()
                    );
                    snapshot.projects = projects;
                    snapshot.tasks = tasks;
                    snapshot.last_error = None;
                }
                Err(e) => {
                    tracing::error!("Error loading data: {e}");
                    snapshot.last_error = Some(format!("Error loading data: {e}"));
                }
            }
            match count {
                Ok(total) => snapshot.total_users = total,
                Err(e) => tracing::error!("Error fetching users count: {e}"),
            }
            snapshot.is_loading = load.others_running();
        });
        result
    }

    pub async fn create_project(&self, input: ProjectInput) -> TrackerResult<Project> {
        let project = self
            .gateway
            .create_project(input)
            .await
            .inspect_err(|e| tracing::error!("Error creating project: {e}"))?;
        self.update(|snapshot| snapshot.projects.insert(0, project.clone()));
        Ok(project)
    }

    pub async fn update_project(&self, id: Uuid, changes: &ProjectChanges) -> TrackerResult<Project> {
        let project = self
            .gateway
            .update_project(id, changes)
            .await
            .inspect_err(|e| tracing::error!("Error updating project: {e}"))?;
        self.update(|snapshot| {
            replace_by_id(&mut snapshot.projects, project.clone(), |p| p.id);
            for task in snapshot.tasks.iter_mut().filter(|t| t.project_id == id) {
                task.project_name = Some(project.name.clone());
            }
        });
        Ok(project)
    }

    /// Removes the project and its tasks from the mirror.
    pub async fn delete_project(&self, id: Uuid) -> TrackerResult<()> {
        self.gateway
            .delete_project(id)
            .await
            .inspect_err(|e| tracing::error!("Error deleting project: {e}"))?;
        self.update(|snapshot| {
            snapshot.projects.retain(|p| p.id != id);
            snapshot.tasks.retain(|t| t.project_id != id);
        });
        Ok(())
    }

    pub async fn create_task(&self, input: TaskInput) -> TrackerResult<Task> {
        let task = self
            .gateway
            .create_task(input)
            .await
            .inspect_err(|e| tracing::error!("Error creating task: {e}"))?;
        self.update(|snapshot| snapshot.tasks.insert(0, task.clone()));
        Ok(task)
    }

    pub async fn update_task(&self, id: Uuid, changes: &TaskChanges) -> TrackerResult<Task> {
        let task = self
            .gateway
            .update_task(id, changes)
            .await
            .inspect_err(|e| tracing::error!("Error updating task: {e}"))?;
        self.update(|snapshot| replace_by_id(&mut snapshot.tasks, task.clone(), |t| t.id));
        Ok(task)
    }

    pub async fn delete_task(&self, id: Uuid) -> TrackerResult<()> {
        self.gateway
            .delete_task(id)
            .await
            .inspect_err(|e| tracing::error!("Error deleting task: {e}"))?;
        self.update(|snapshot| snapshot.tasks.retain(|t| t.id != id));
        Ok(())
    }

    /// Stop following the session. Completions after this are discarded.
    pub fn shutdown(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.closed.borrow()
    }

    fn current_profile(&self) -> Option<Profile> {
        lock(&self.profile).clone()
    }

    fn update(&self, f: impl FnOnce(&mut CacheSnapshot)) {
        if self.is_shut_down() {
            return;
        }
        self.snapshot.send_modify(f);
    }
}

/// One refresh in flight. Dropping it, on any path, clears `is_loading` once
/// no other refresh is running.
struct Loading<'a> {
    cache: &'a DataCache,
}

impl<'a> Loading<'a> {
    fn start(cache: &'a DataCache) -> Self {
        cache.loads.fetch_add(1, Ordering::SeqCst);
        cache.update(|snapshot| snapshot.is_loading = true);
        Self { cache }
    }

    fn others_running(&self) -> bool {
        self.cache.loads.load(Ordering::SeqCst) > 1
    }
}

impl Drop for Loading<'_> {
    fn drop(&mut self) {
        if self.cache.loads.fetch_sub(1, Ordering::SeqCst) > 1 || self.cache.is_shut_down() {
            return;
        }
        self.cache.snapshot.send_if_modified(|snapshot| {
            std::mem::replace(&mut snapshot.is_loading, false)
        });
    }
}

impl Drop for DataCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn follow(
    cache: Weak<DataCache>,
    mut session: watch::Receiver<SessionState>,
    mut closed: watch::Receiver<bool>,
) {
    // Outer None: nothing settled yet. Inner None: anonymous.
    let mut last: Option<Option<ProfileKey>> = None;

    loop {
        let settled = {
            let state = session.borrow_and_update();
            state.is_settled().then(|| state.profile().cloned())
        };

        if let Some(profile) = settled {
            let key = profile.as_ref().map(key_of);
            if last != Some(key) {
                last = Some(key);
                let Some(cache) = cache.upgrade() else { break };
                if profile.is_none() {
                    tracing::info!("Session ended, clearing cached data");
                }
                cache.set_profile(profile);
                // Failures are recorded on the snapshot.
                let _ = cache.refresh().await;
            }
        }

        tokio::select! {
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = closed.wait_for(|closed| *closed) => break,
        }
    }
}

fn replace_by_id<T>(items: &mut [T], item: T, id: impl Fn(&T) -> Uuid) {
    let target = id(&item);
    if let Some(slot) = items.iter_mut().find(|existing| id(existing) == target) {
        *slot = item;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
