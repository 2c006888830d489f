use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Acceptance, ProjectStore, StoreError, TaskUpdate, UserStore};
use crate::models::{
    Application, ApplicationStatus, Participant, Project, Role, Task, TaskChanges, User,
};

/// Process-local store. Each operation holds the write lock for its whole
/// read-modify-write, which gives the same single-document atomicity as the
/// MongoDB updates.
#[derive(Clone, Default)]
pub struct MemoryStore {
    projects: Arc<RwLock<HashMap<String, Project>>>,
    /// Keyed by email.
    users: Arc<RwLock<HashMap<String, User>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_project<F>(&self, project_id: &str, f: F) -> bool
    where
        F: FnOnce(&mut Project) + Send,
    {
        let mut projects = self.projects.write().await;
        match projects.get_mut(project_id) {
            Some(project) => {
                f(project);
                project.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ProjectStore for MemoryStore {
    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.projects
            .write()
            .await
            .insert(project.project_id.clone(), project.clone());
        Ok(())
    }

    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.read().await.get(project_id).cloned())
    }

    async fn list_projects_for_user(&self, user_id: &str) -> Result<Vec<Project>, StoreError> {
        Ok(self
            .projects
            .read()
            .await
            .values()
            .filter(|p| p.owner_id == user_id || p.is_member(user_id) || p.is_authorized(user_id))
            .cloned()
            .collect())
    }

    async fn delete_project(&self, project_id: &str) -> Result<bool, StoreError> {
        Ok(self.projects.write().await.remove(project_id).is_some())
    }

    async fn push_personnel(
        &self,
        project_id: &str,
        person: &Participant,
    ) -> Result<bool, StoreError> {
        let person = person.clone();
        Ok(self
            .with_project(project_id, |p| p.authorized_personnel.push(person))
            .await)
    }

    async fn push_role(&self, project_id: &str, role: &Role) -> Result<bool, StoreError> {
        let role = role.clone();
        Ok(self.with_project(project_id, |p| p.roles.push(role)).await)
    }

    async fn push_application(
        &self,
        project_id: &str,
        application: &Application,
    ) -> Result<bool, StoreError> {
        let application = application.clone();
        Ok(self
            .with_project(project_id, |p| p.applications.push(application))
            .await)
    }

    async fn accept_application(
        &self,
        project_id: &str,
        acceptance: &Acceptance,
    ) -> Result<bool, StoreError> {
        let mut projects = self.projects.write().await;
        let Some(project) = projects.get_mut(project_id) else {
            return Ok(false);
        };
        if project.is_member(&acceptance.member.user_id) {
            return Ok(false);
        }
        let Some(role_index) = project
            .roles
            .iter()
            .position(|r| r.role_id == acceptance.role_id && r.filled == acceptance.observed_filled)
        else {
            return Ok(false);
        };
        let Some(application) = project.applications.iter_mut().find(|a| {
            a.application_id == acceptance.application_id
                && a.status == ApplicationStatus::Pending
        }) else {
            return Ok(false);
        };

        application.status = ApplicationStatus::Accepted;
        project.roles[role_index].filled += 1;
        project.members.push(acceptance.member.clone());
        project.updated_at = acceptance.at;
        Ok(true)
    }

    async fn push_task(&self, project_id: &str, task: &Task) -> Result<bool, StoreError> {
        let task = task.clone();
        Ok(self.with_project(project_id, |p| p.tasks.push(task)).await)
    }

    async fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        expected_version: i64,
        changes: &TaskChanges,
    ) -> Result<TaskUpdate, StoreError> {
        let mut projects = self.projects.write().await;
        let Some(project) = projects.get_mut(project_id) else {
            return Ok(TaskUpdate::Missing);
        };
        let Some(task) = project.tasks.iter_mut().find(|t| t.task_id == task_id) else {
            return Ok(TaskUpdate::Missing);
        };
        if task.version != expected_version {
            return Ok(TaskUpdate::VersionMismatch {
                current: task.version,
            });
        }
        changes.apply(task);
        let updated = task.clone();
        project.updated_at = changes.updated_at;
        Ok(TaskUpdate::Updated(updated))
    }

    async fn pull_task(&self, project_id: &str, task_id: &str) -> Result<bool, StoreError> {
        let mut projects = self.projects.write().await;
        let Some(project) = projects.get_mut(project_id) else {
            return Ok(false);
        };
        let before = project.tasks.len();
        project.tasks.retain(|t| t.task_id != task_id);
        if project.tasks.len() == before {
            return Ok(false);
        }
        project.updated_at = Utc::now();
        Ok(true)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<bool, StoreError> {
        let mut users = self.users.write().await;
        if users.contains_key(&user.email) {
            return Ok(false);
        }
        users.insert(user.email.clone(), user.clone());
        Ok(true)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(email).cloned())
    }
}
