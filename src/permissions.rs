//! Permission evaluation for task operations.
//!
//! The role is derived once from the persisted project and the verified
//! identity; every check below takes the resulting [`Actor`]. The server
//! uses these functions as the authoritative gate and the board controller
//! uses the same ones to decide what to offer before touching the network.

use serde::Serialize;
use thiserror::Error;

use crate::models::{ActorIdentity, Project, Task, TaskField, TaskStatus};
use crate::state_machine::Transition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Owner,
    AuthorizedPersonnel,
    TeamMember,
    Stranger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub identity: ActorIdentity,
    pub role: ActorRole,
}

/// Why an operation was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Denial {
    #[error("not a participant of this project")]
    NotParticipant,
    #[error("only the project owner may {0}")]
    OwnerOnly(&'static str),
    #[error("only the assignee or the project owner may change this task")]
    NotAssignee,
    #[error("only the project owner may verify a task")]
    VerifyRequiresOwner,
    #[error("task is verified and can no longer be changed")]
    TaskVerified,
    #[error("only the project owner may change `{0}`")]
    FieldRestricted(TaskField),
    #[error("cannot move a task from {from} to {to}")]
    IllegalTransition { from: TaskStatus, to: TaskStatus },
}

impl Actor {
    /// Computes the actor's role in `project`. Owner wins over authorized
    /// personnel, which wins over team membership.
    pub fn resolve(project: &Project, identity: ActorIdentity) -> Self {
        let user_id = identity.user_id.as_str();
        let role = if project.owner_id == user_id {
            ActorRole::Owner
        } else if project.is_authorized(user_id) {
            ActorRole::AuthorizedPersonnel
        } else if project.is_member(user_id) {
            ActorRole::TeamMember
        } else {
            ActorRole::Stranger
        };
        Self { identity, role }
    }

    pub fn is_owner(&self) -> bool {
        self.role == ActorRole::Owner
    }

    pub fn is_assignee_of(&self, task: &Task) -> bool {
        task.is_assigned_to(&self.identity.user_id)
    }
}

pub fn authorize_view(actor: &Actor) -> Result<(), Denial> {
    match actor.role {
        ActorRole::Stranger => Err(Denial::NotParticipant),
        _ => Ok(()),
    }
}

pub fn authorize_create(actor: &Actor) -> Result<(), Denial> {
    authorize_view(actor)?;
    if actor.is_owner() {
        Ok(())
    } else {
        Err(Denial::OwnerOnly("create tasks"))
    }
}

pub fn authorize_delete(actor: &Actor) -> Result<(), Denial> {
    authorize_view(actor)?;
    if actor.is_owner() {
        Ok(())
    } else {
        Err(Denial::OwnerOnly("delete tasks"))
    }
}

/// Decides whether `actor` may change `fields` of `task`, moving it to
/// `target` when a status change is among them. Either every requested
/// field is allowed or the whole edit is refused.
pub fn authorize_edit(
    actor: &Actor,
    task: &Task,
    fields: &[TaskField],
    target: Option<TaskStatus>,
) -> Result<(), Denial> {
    authorize_view(actor)?;

    let transition = target.map(|to| (to, task.status.transition_to(to)));

    if actor.is_owner() {
        return match transition {
            Some((to, Transition::Forbidden)) => Err(Denial::IllegalTransition {
                from: task.status,
                to,
            }),
            _ => Ok(()),
        };
    }

    if !actor.is_assignee_of(task) {
        return Err(Denial::NotAssignee);
    }
    if target == Some(TaskStatus::Verified) {
        return Err(Denial::VerifyRequiresOwner);
    }
    if task.status.is_terminal() {
        return Err(Denial::TaskVerified);
    }
    if let Some(field) = fields.iter().find(|f| **f != TaskField::Status) {
        return Err(Denial::FieldRestricted(*field));
    }
    match transition {
        Some((_, Transition::NoOp | Transition::Allowed)) | None => Ok(()),
        Some((to, Transition::OwnerOnly | Transition::Forbidden)) => {
            Err(Denial::IllegalTransition {
                from: task.status,
                to,
            })
        }
    }
}

/// Statuses other than the current one that `actor` could move `task` to.
pub fn allowed_targets(actor: &Actor, task: &Task) -> Vec<TaskStatus> {
    TaskStatus::ALL
        .into_iter()
        .filter(|to| *to != task.status)
        .filter(|to| authorize_edit(actor, task, &[TaskField::Status], Some(*to)).is_ok())
        .collect()
}
