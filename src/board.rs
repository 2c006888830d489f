// src/board.rs

//! Client-side board controller. Keeps the visible task list for one
//! project, gates drags and edits with the same permission rules the server
//! enforces, applies drops optimistically and reconciles with the server.

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use thiserror::Error;

use crate::models::{
    ActorIdentity, CreateTaskRequest, Priority, Task, TaskField, TaskStatus, UpdateTaskRequest,
};
use crate::permissions::{self, Actor, Denial};
use crate::task_client::{ClientError, ErrorKind, TaskApi};

#[derive(Debug, Error)]
pub enum BoardError {
    #[error(transparent)]
    Denied(#[from] Denial),
    #[error("{0}")]
    Validation(String),
    #[error("task {0} is not on the board")]
    UnknownTask(String),
    #[error(transparent)]
    Api(#[from] ClientError),
}

/// What happened to a dropped card.
#[derive(Debug, Clone, PartialEq)]
pub enum DropOutcome {
    /// Dropped on its own column.
    Unchanged,
    /// Refused locally, nothing was sent.
    Rejected(Denial),
    /// Persisted; carries the server's copy.
    Applied(Task),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssigneeFilter {
    All,
    /// Tasks assigned to the acting user.
    Mine,
    /// Tasks assigned to this email, compared case-insensitively.
    Email(String),
}

#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<NaiveDate>,
    /// User id of the assignee.
    pub assignee: Option<String>,
}

/// Desired values for an edit. Fields left `None` are not touched; fields
/// equal to the current value are dropped from the request.
#[derive(Debug, Clone, Default)]
pub struct TaskEdit {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<Option<NaiveDate>>,
    pub assigned_to: Option<Option<String>>,
}

impl TaskEdit {
    fn diff_against(&self, task: &Task) -> UpdateTaskRequest {
        let current_assignee = task.assigned_to.as_ref().map(|p| p.user_id.as_str());
        let mut req = UpdateTaskRequest::new(&task.task_id);
        req.expected_version = Some(task.version);
        req.title = self.title.clone().filter(|t| *t != task.title);
        req.description = self
            .description
            .clone()
            .filter(|d| *d != task.description);
        req.priority = self.priority.filter(|p| *p != task.priority);
        req.status = self.status.filter(|s| *s != task.status);
        req.due_date = self.due_date.filter(|d| *d != task.due_date);
        req.assigned_to = self
            .assigned_to
            .clone()
            .filter(|a| a.as_deref() != current_assignee);
        req
    }
}

struct BoardState {
    actor: Actor,
    tasks: Vec<Task>,
    /// Latest mutation ticket per task. Only the holder of the latest
    /// ticket may reconcile or roll back that task.
    latest: HashMap<String, u64>,
    next_ticket: u64,
}

impl BoardState {
    fn position(&self, task_id: &str) -> Result<usize, BoardError> {
        self.tasks
            .iter()
            .position(|t| t.task_id == task_id)
            .ok_or_else(|| BoardError::UnknownTask(task_id.to_string()))
    }

    fn get(&self, task_id: &str) -> Result<&Task, BoardError> {
        let index = self.position(task_id)?;
        Ok(&self.tasks[index])
    }

    fn issue_ticket(&mut self, task_id: &str) -> u64 {
        self.next_ticket += 1;
        self.latest.insert(task_id.to_string(), self.next_ticket);
        self.next_ticket
    }

    /// Retires `ticket`, returning whether it was still the latest one.
    fn settle(&mut self, task_id: &str, ticket: u64) -> bool {
        if self.latest.get(task_id) == Some(&ticket) {
            self.latest.remove(task_id);
            true
        } else {
            false
        }
    }

    fn replace(&mut self, task: Task) {
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.task_id == task.task_id) {
            *slot = task;
        }
    }

    /// Takes a server copy whose mutation was superseded locally. A newer
    /// copy replaces the card once nothing is in flight; otherwise only its
    /// version is kept so the next request is sent against it.
    fn absorb(&mut self, task: Task) {
        let in_flight = self.latest.contains_key(&task.task_id);
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.task_id == task.task_id) {
            if task.version <= slot.version {
                return;
            }
            if in_flight {
                slot.version = task.version;
            } else {
                *slot = task;
            }
        }
    }

    /// Rolls the card back to `prior` without lowering its version.
    fn restore(&mut self, mut prior: Task) {
        if let Some(slot) = self.tasks.iter_mut().find(|t| t.task_id == prior.task_id) {
            prior.version = prior.version.max(slot.version);
            *slot = prior;
        }
    }

    fn remove(&mut self, task_id: &str) {
        self.tasks.retain(|t| t.task_id != task_id);
        self.latest.remove(task_id);
    }
}

pub struct BoardController<A> {
    api: A,
    identity: ActorIdentity,
    project_id: String,
    state: Mutex<BoardState>,
}

impl<A: TaskApi> BoardController<A> {
    pub async fn load(
        api: A,
        identity: ActorIdentity,
        project_id: impl Into<String>,
    ) -> Result<Self, BoardError> {
        let project_id = project_id.into();
        let (actor, tasks) = fetch(&api, &identity, &project_id).await?;
        info!(
            "Board {} loaded with {} tasks as {:?}",
            project_id,
            tasks.len(),
            actor.role
        );
        Ok(Self {
            api,
            identity,
            project_id,
            state: Mutex::new(BoardState {
                actor,
                tasks,
                latest: HashMap::new(),
                next_ticket: 0,
            }),
        })
    }

    /// Replaces the local view with the server's. In-flight mutations issued
    /// before the reload no longer touch the local state when they finish.
    pub async fn reload(&self) -> Result<(), BoardError> {
        let (actor, tasks) = fetch(&self.api, &self.identity, &self.project_id).await?;
        let mut state = self.state.lock();
        state.actor = actor;
        state.tasks = tasks;
        state.latest.clear();
        Ok(())
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.lock().tasks.clone()
    }

    pub fn task(&self, task_id: &str) -> Option<Task> {
        self.state.lock().get(task_id).ok().cloned()
    }

    pub fn actor(&self) -> Actor {
        self.state.lock().actor.clone()
    }

    /// Columns the card may be dropped on, or `None` when it cannot be
    /// dragged at all.
    pub fn begin_drag(&self, task_id: &str) -> Option<Vec<TaskStatus>> {
        let state = self.state.lock();
        let task = state.get(task_id).ok()?;
        let targets = permissions::allowed_targets(&state.actor, task);
        if targets.is_empty() {
            None
        } else {
            Some(targets)
        }
    }

    pub async fn complete_drag(
        &self,
        task_id: &str,
        target: TaskStatus,
    ) -> Result<DropOutcome, BoardError> {
        let (prior, req, ticket) = {
            let mut state = self.state.lock();
            let index = state.position(task_id)?;
            let actor = state.actor.clone();
            let task = &mut state.tasks[index];
            if task.status == target {
                return Ok(DropOutcome::Unchanged);
            }
            if let Err(denial) =
                permissions::authorize_edit(&actor, task, &[TaskField::Status], Some(target))
            {
                debug!("Drop of {} on {} refused: {}", task_id, target, denial);
                return Ok(DropOutcome::Rejected(denial));
            }

            let prior = task.clone();
            task.status = target;
            if target == TaskStatus::Verified {
                task.verified_by = Some(actor.identity.name.clone());
                task.verified_at = Some(Utc::now());
            }

            let mut req = UpdateTaskRequest::new(task_id);
            req.expected_version = Some(prior.version);
            req.status = Some(target);
            (prior, req, state.issue_ticket(task_id))
        };

        match self.api.update_task(&self.project_id, &req).await {
            Ok(task) => {
                let mut state = self.state.lock();
                if state.settle(task_id, ticket) {
                    state.replace(task.clone());
                } else {
                    state.absorb(task.clone());
                }
                Ok(DropOutcome::Applied(task))
            }
            Err(err) => {
                warn!("Moving {} to {} failed: {}", task_id, target, err);
                {
                    let mut state = self.state.lock();
                    if err.is_not_found() {
                        state.remove(task_id);
                    } else if state.settle(task_id, ticket) {
                        state.restore(prior);
                    }
                }
                if err.kind() == ErrorKind::Conflict {
                    self.refresh_task(task_id).await;
                }
                Err(err.into())
            }
        }
    }

    /// Re-reads one card after a version conflict so the next attempt is
    /// made against the server's copy. Skipped while a newer mutation on the
    /// card is in flight.
    async fn refresh_task(&self, task_id: &str) {
        let tasks = match self.api.list_tasks(&self.project_id).await {
            Ok(tasks) => tasks,
            Err(err) => {
                warn!("Could not refresh task {}: {}", task_id, err);
                return;
            }
        };
        let fresh = tasks.into_iter().find(|t| t.task_id == task_id);
        let mut state = self.state.lock();
        if state.latest.contains_key(task_id) {
            return;
        }
        match fresh {
            Some(task) => state.replace(task),
            None => state.remove(task_id),
        }
    }

    pub fn filter_by_assignee(&self, filter: &AssigneeFilter) -> Vec<Task> {
        let state = self.state.lock();
        state
            .tasks
            .iter()
            .filter(|task| match filter {
                AssigneeFilter::All => true,
                AssigneeFilter::Mine => task.is_assigned_to(&state.actor.identity.user_id),
                AssigneeFilter::Email(email) => task
                    .assigned_to
                    .as_ref()
                    .is_some_and(|a| a.email.eq_ignore_ascii_case(email.trim())),
            })
            .cloned()
            .collect()
    }

    pub async fn create_task(&self, new_task: NewTask) -> Result<Task, BoardError> {
        permissions::authorize_create(&self.state.lock().actor)?;
        let title = new_task.title.trim();
        if title.is_empty() {
            return Err(BoardError::Validation("title must not be empty".into()));
        }
        let req = CreateTaskRequest {
            title: title.to_string(),
            description: new_task.description,
            priority: new_task.priority,
            due_date: new_task.due_date,
            assigned_to: new_task.assignee,
        };
        let task = self.api.create_task(&self.project_id, &req).await?;
        self.state.lock().tasks.push(task.clone());
        Ok(task)
    }

    /// Sends only the fields that differ from the local copy. Returns
    /// `Ok(None)` when nothing differs.
    pub async fn edit_task(
        &self,
        task_id: &str,
        edit: TaskEdit,
    ) -> Result<Option<Task>, BoardError> {
        let (req, ticket) = {
            let mut state = self.state.lock();
            let task = state.get(task_id)?;
            let req = edit.diff_against(task);
            let fields = req.requested_fields();
            if fields.is_empty() {
                return Ok(None);
            }
            permissions::authorize_edit(&state.actor, task, &fields, req.status)?;
            if let Some(title) = &req.title {
                if title.trim().is_empty() {
                    return Err(BoardError::Validation("title must not be empty".into()));
                }
            }
            (req, state.issue_ticket(task_id))
        };

        match self.api.update_task(&self.project_id, &req).await {
            Ok(task) => {
                let mut state = self.state.lock();
                if state.settle(task_id, ticket) {
                    state.replace(task.clone());
                } else {
                    state.absorb(task.clone());
                }
                Ok(Some(task))
            }
            Err(err) => {
                {
                    let mut state = self.state.lock();
                    if err.is_not_found() {
                        state.remove(task_id);
                    } else {
                        state.settle(task_id, ticket);
                    }
                }
                if err.kind() == ErrorKind::Conflict {
                    self.refresh_task(task_id).await;
                }
                Err(err.into())
            }
        }
    }

    /// Deletes after `confirm` approves. The card leaves the board only once
    /// the server has removed it.
    pub async fn delete_task<F>(&self, task_id: &str, confirm: F) -> Result<DeleteOutcome, BoardError>
    where
        F: FnOnce(&Task) -> bool,
    {
        let task = {
            let state = self.state.lock();
            permissions::authorize_delete(&state.actor)?;
            state.get(task_id)?.clone()
        };
        if !confirm(&task) {
            return Ok(DeleteOutcome::Cancelled);
        }

        let result = self.api.delete_task(&self.project_id, task_id).await;
        match result {
            Ok(()) => {
                self.state.lock().remove(task_id);
                info!("Task {} deleted from board {}", task_id, self.project_id);
                Ok(DeleteOutcome::Deleted)
            }
            Err(err) => {
                if err.is_not_found() {
                    self.state.lock().remove(task_id);
                }
                Err(err.into())
            }
        }
    }
}

async fn fetch<A: TaskApi>(
    api: &A,
    identity: &ActorIdentity,
    project_id: &str,
) -> Result<(Actor, Vec<Task>), ClientError> {
    let project = api.fetch_project(project_id).await?;
    let tasks = api.list_tasks(project_id).await?;
    Ok((Actor::resolve(&project, identity.clone()), tasks))
}
