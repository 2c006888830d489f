//! Persistence boundary. Projects are single documents with their tasks,
//! roles, members and applications embedded; every mutation here is one
//! atomic single-document update.

mod memory;
mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Application, Member, Participant, Project, Role, Task, TaskChanges, User};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] mongodb::bson::ser::Error),
    #[error("deserialization error: {0}")]
    Deserialization(#[from] mongodb::bson::de::Error),
}

/// Result of a version-guarded task update.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskUpdate {
    Updated(Task),
    /// The project or the task is gone.
    Missing,
    /// The task changed since the caller read it.
    VersionMismatch { current: i64 },
}

/// Everything accepting an application writes in one update. The write only
/// happens while the role's `filled` still equals `observed_filled`, the
/// application is still pending and the user is not yet a member.
#[derive(Debug, Clone)]
pub struct Acceptance {
    pub application_id: String,
    pub role_id: String,
    pub observed_filled: u32,
    pub member: Member,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn insert_project(&self, project: &Project) -> Result<(), StoreError>;

    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, StoreError>;

    /// Projects the user owns, is a member of, or is authorized on.
    async fn list_projects_for_user(&self, user_id: &str) -> Result<Vec<Project>, StoreError>;

    async fn delete_project(&self, project_id: &str) -> Result<bool, StoreError>;

    async fn push_personnel(
        &self,
        project_id: &str,
        person: &Participant,
    ) -> Result<bool, StoreError>;

    async fn push_role(&self, project_id: &str, role: &Role) -> Result<bool, StoreError>;

    async fn push_application(
        &self,
        project_id: &str,
        application: &Application,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when the guard in [`Acceptance`] no longer holds.
    async fn accept_application(
        &self,
        project_id: &str,
        acceptance: &Acceptance,
    ) -> Result<bool, StoreError>;

    /// Returns `false` when the project does not exist.
    async fn push_task(&self, project_id: &str, task: &Task) -> Result<bool, StoreError>;

    /// Writes `changes` to the task only if its version is still
    /// `expected_version`, bumping the version in the same update.
    async fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        expected_version: i64,
        changes: &TaskChanges,
    ) -> Result<TaskUpdate, StoreError>;

    /// Returns `false` when the project or the task does not exist.
    async fn pull_task(&self, project_id: &str, task_id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Returns `false` when the email is already registered.
    async fn insert_user(&self, user: &User) -> Result<bool, StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
}
