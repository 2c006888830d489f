use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::task::Task;

/// A project document. Tasks are embedded so that every task mutation is a
/// single-document update and deleting the project takes its tasks with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub owner_id: String,
    pub owner_name: String,
    pub owner_email: String,
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub authorized_personnel: Vec<Participant>,
    #[serde(default)]
    pub members: Vec<Member>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub applications: Vec<Application>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user reference: stable id plus denormalized display fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: String,
    pub email: String,
    pub name: String,
}

/// A user whose application to a role was accepted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role_id: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    pub role_id: String,
    pub role_name: String,
    #[serde(default)]
    pub mandatory_skills: Vec<String>,
    pub needed: u32,
    pub filled: u32,
}

impl Role {
    pub fn is_full(&self) -> bool {
        self.filled >= self.needed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    Pending,
    Accepted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub application_id: String,
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub role_id: String,
    pub message: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.task_id == task_id)
    }

    pub fn role(&self, role_id: &str) -> Option<&Role> {
        self.roles.iter().find(|r| r.role_id == role_id)
    }

    pub fn application(&self, application_id: &str) -> Option<&Application> {
        self.applications
            .iter()
            .find(|a| a.application_id == application_id)
    }

    pub fn is_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m.user_id == user_id)
    }

    pub fn is_authorized(&self, user_id: &str) -> bool {
        self.authorized_personnel
            .iter()
            .any(|p| p.user_id == user_id)
    }

    /// Resolves a user id to someone a task may be assigned to: the owner,
    /// an authorized person or an accepted member.
    pub fn participant(&self, user_id: &str) -> Option<Participant> {
        if self.owner_id == user_id {
            return Some(Participant {
                user_id: self.owner_id.clone(),
                email: self.owner_email.clone(),
                name: self.owner_name.clone(),
            });
        }
        if let Some(person) = self
            .authorized_personnel
            .iter()
            .find(|p| p.user_id == user_id)
        {
            return Some(person.clone());
        }
        self.members
            .iter()
            .find(|m| m.user_id == user_id)
            .map(|m| Participant {
                user_id: m.user_id.clone(),
                email: m.email.clone(),
                name: m.name.clone(),
            })
    }
}
