use std::sync::Arc;

use uuid::Uuid;

use crate::models::{
    CompanyId, Identity, NewProject, NewTask, Project, ProjectChanges, ProjectInput, Task,
    TaskChanges, TaskInput,
};
use crate::tracker::error::{TrackerError, TrackerResult};
use crate::tracker::identity::IdentityStore;
use crate::tracker::store::TenantStore;

/// Company-scoped project and task operations.
///
/// Writes look up the caller's company from the profile row on every call so
/// a stale session never writes into the wrong tenant. Errors are returned
/// unchanged.
#[derive(Clone)]
pub struct TenantGateway {
    identity: Arc<dyn IdentityStore>,
    store: Arc<dyn TenantStore>,
}

impl TenantGateway {
    pub fn new(identity: Arc<dyn IdentityStore>, store: Arc<dyn TenantStore>) -> Self {
        Self { identity, store }
    }

    pub async fn list_projects(&self) -> TrackerResult<Vec<Project>> {
        self.store.list_projects().await
    }

    pub async fn create_project(&self, input: ProjectInput) -> TrackerResult<Project> {
        let (_, company_id) = self.caller().await?;

        let project = NewProject {
            name: input.name,
            description: input.description.filter(|d| !d.is_empty()),
            company_id,
        };
        let created = self.store.insert_project(&project).await?;
        tracing::info!("Created project {} in company {company_id}", created.id);
        Ok(created)
    }

    pub async fn update_project(&self, id: Uuid, changes: &ProjectChanges) -> TrackerResult<Project> {
        self.store.update_project(id, changes).await
    }

    /// Tasks of the project are removed by the store.
    pub async fn delete_project(&self, id: Uuid) -> TrackerResult<()> {
        self.store.delete_project(id).await?;
        tracing::info!("Deleted project {id}");
        Ok(())
    }

    pub async fn list_tasks(&self) -> TrackerResult<Vec<Task>> {
        self.store.list_tasks().await
    }

    pub async fn create_task(&self, input: TaskInput) -> TrackerResult<Task> {
        let (identity, company_id) = self.caller().await?;

        let task = NewTask {
            title: input.title,
            description: input.description.filter(|d| !d.is_empty()),
            status: input.status,
            project_id: input.project_id,
            assigned_user_id: input.assigned_user_id.unwrap_or(identity.id),
            company_id,
        };
        self.store.insert_task(&task).await
    }

    pub async fn update_task(&self, id: Uuid, changes: &TaskChanges) -> TrackerResult<Task> {
        self.store.update_task(id, changes).await
    }

    pub async fn delete_task(&self, id: Uuid) -> TrackerResult<()> {
        self.store.delete_task(id).await
    }

    /// Number of profiles in the company. An unresolved company has none.
    pub async fn count_members(&self, company_id: &CompanyId) -> TrackerResult<i64> {
        match company_id.known() {
            Some(id) => self.store.count_profiles(id).await,
            None => Ok(0),
        }
    }

    /// Current identity and the company its profile belongs to.
    async fn caller(&self) -> TrackerResult<(Identity, Uuid)> {
        let identity = self
            .identity
            .get_user()
            .await?
            .ok_or(TrackerError::Unauthenticated)?;

        let row = match self.store.fetch_profile(identity.id).await {
            Ok(row) => row,
            Err(TrackerError::Unauthenticated) => return Err(TrackerError::Unauthenticated),
            Err(e) => {
                tracing::warn!("Could not load profile for {}: {e}", identity.id);
                None
            }
        };

        let company_id = row
            .and_then(|row| row.company_id)
            .ok_or(TrackerError::ProfileMissing)?;
        Ok((identity, company_id))
    }
}
