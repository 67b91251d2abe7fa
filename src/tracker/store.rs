use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{NewProject, NewTask, ProfileRow, Project, ProjectChanges, Task, TaskChanges};
use crate::tracker::error::TrackerResult;

/// Backing store boundary.
///
/// Every call runs as the identity of the current session and the store
/// applies its company row policy: reads only return the caller's company
/// rows and writes into another company are rejected.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Profile row keyed by identity id, `None` when missing or not visible.
    async fn fetch_profile(&self, id: Uuid) -> TrackerResult<Option<ProfileRow>>;

    async fn count_profiles(&self, company_id: Uuid) -> TrackerResult<i64>;

    /// Newest first.
    async fn list_projects(&self) -> TrackerResult<Vec<Project>>;

    async fn insert_project(&self, project: &NewProject) -> TrackerResult<Project>;

    async fn update_project(&self, id: Uuid, changes: &ProjectChanges) -> TrackerResult<Project>;

    async fn delete_project(&self, id: Uuid) -> TrackerResult<()>;

    /// Newest first, with the project name joined in.
    async fn list_tasks(&self) -> TrackerResult<Vec<Task>>;

    async fn insert_task(&self, task: &NewTask) -> TrackerResult<Task>;

    async fn update_task(&self, id: Uuid, changes: &TaskChanges) -> TrackerResult<Task>;

    async fn delete_task(&self, id: Uuid) -> TrackerResult<()>;
}
