//! Task API surface: the authoritative enforcement point for task changes.
//!
//! Every operation reloads the project, derives the caller's role from the
//! persisted document and decides on persisted state only. Client-side
//! checks in the board controller are a convenience, never trusted here.

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::{debug, info, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::ApiError;
use crate::models::{
    ActorIdentity, CreateTaskRequest, Participant, Project, Task, TaskChanges, TaskStatus,
    UpdateTaskRequest,
};
use crate::permissions::{self, Actor};
use crate::store::{ProjectStore, TaskUpdate};

#[derive(Debug, Deserialize)]
pub struct DeleteTaskQuery {
    pub task_id: String,
}

async fn load_project(store: &dyn ProjectStore, project_id: &str) -> Result<Project, ApiError> {
    store
        .find_project(project_id)
        .await?
        .ok_or(ApiError::NotFound("Project"))
}

fn non_empty_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("title must not be empty"));
    }
    Ok(title.to_string())
}

/// Resolves an assignee id against the project's current participants.
fn resolve_assignee(project: &Project, user_id: &str) -> Result<Participant, ApiError> {
    project.participant(user_id).ok_or_else(|| {
        ApiError::validation(
            "assignee must be the owner, authorized personnel or a team member of this project",
        )
    })
}

pub async fn list(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    project_id: &str,
) -> Result<Vec<Task>, ApiError> {
    let project = load_project(store, project_id).await?;
    let actor = Actor::resolve(&project, identity);
    permissions::authorize_view(&actor)?;
    Ok(project.tasks)
}

pub async fn create(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    project_id: &str,
    req: CreateTaskRequest,
) -> Result<Task, ApiError> {
    let project = load_project(store, project_id).await?;
    let actor = Actor::resolve(&project, identity);
    permissions::authorize_create(&actor)?;

    let title = non_empty_title(&req.title)?;
    let assigned_to = req
        .assigned_to
        .as_deref()
        .map(|user_id| resolve_assignee(&project, user_id))
        .transpose()?;

    let now = Utc::now();
    let task = Task {
        task_id: Uuid::new_v4().to_string(),
        title,
        description: req.description,
        assigned_to,
        priority: req.priority.unwrap_or_default(),
        status: TaskStatus::Pending,
        due_date: req.due_date,
        verified_by: None,
        verified_at: None,
        created_by: actor.identity.user_id.clone(),
        created_at: now,
        updated_at: now,
        version: 1,
    };

    if !store.push_task(project_id, &task).await? {
        return Err(ApiError::NotFound("Project"));
    }
    info!("Task {} created in project {}", task.task_id, project_id);
    Ok(task)
}

/// Applies a PATCH. Authorization covers the whole request: if any field
/// is refused nothing is written.
pub async fn update(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    project_id: &str,
    req: UpdateTaskRequest,
) -> Result<Task, ApiError> {
    let project = load_project(store, project_id).await?;
    let actor = Actor::resolve(&project, identity);
    permissions::authorize_view(&actor)?;

    let task = project
        .task(&req.task_id)
        .ok_or(ApiError::NotFound("Task"))?;

    let fields = req.requested_fields();
    permissions::authorize_edit(&actor, task, &fields, req.status)?;

    if let Some(expected) = req.expected_version {
        if expected != task.version {
            return Err(ApiError::conflict(format!(
                "task was modified (version {} is not {})",
                task.version, expected
            )));
        }
    }
    if fields.is_empty() {
        return Err(ApiError::validation("No fields to update"));
    }

    let now = Utc::now();
    let mut changes = TaskChanges::new(now);
    if let Some(title) = &req.title {
        changes.title = Some(non_empty_title(title)?);
    }
    changes.description = req.description.clone();
    changes.priority = req.priority;
    changes.due_date = req.due_date;
    if let Some(assignee) = &req.assigned_to {
        changes.assigned_to = Some(
            assignee
                .as_deref()
                .map(|user_id| resolve_assignee(&project, user_id))
                .transpose()?,
        );
    }
    if let Some(status) = req.status {
        if status != task.status {
            changes.status = Some(status);
            if status == TaskStatus::Verified {
                changes.verified_by = Some(actor.identity.name.clone());
                changes.verified_at = Some(now);
            }
        }
    }

    debug!("Applying {:?} to task {}", changes, task.task_id);
    match store
        .update_task(project_id, &task.task_id, task.version, &changes)
        .await?
    {
        TaskUpdate::Updated(updated) => {
            info!(
                "Task {} updated by {} (version {})",
                updated.task_id, actor.identity.user_id, updated.version
            );
            Ok(updated)
        }
        TaskUpdate::Missing => Err(ApiError::NotFound("Task")),
        TaskUpdate::VersionMismatch { current } => {
            warn!(
                "Concurrent write on task {}: read version {}, now {}",
                task.task_id, task.version, current
            );
            Err(ApiError::conflict(
                "task was modified concurrently, reload and retry",
            ))
        }
    }
}

pub async fn delete(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    project_id: &str,
    task_id: &str,
) -> Result<(), ApiError> {
    let project = load_project(store, project_id).await?;
    let actor = Actor::resolve(&project, identity);
    permissions::authorize_delete(&actor)?;

    if project.task(task_id).is_none() || !store.pull_task(project_id, task_id).await? {
        return Err(ApiError::NotFound("Task"));
    }
    info!("Task {} deleted from project {}", task_id, project_id);
    Ok(())
}

/// GET /projects/{project_id}/tasks
pub async fn list_tasks(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let tasks = list(data.projects.as_ref(), identity, &project_id).await?;
    Ok(HttpResponse::Ok().json(tasks))
}

/// POST /projects/{project_id}/tasks
pub async fn create_task(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    payload: web::Json<CreateTaskRequest>,
) -> Result<HttpResponse, ApiError> {
    let task = create(data.projects.as_ref(), identity, &project_id, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(task))
}

/// PATCH /projects/{project_id}/tasks
pub async fn update_task(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    payload: web::Json<UpdateTaskRequest>,
) -> Result<HttpResponse, ApiError> {
    let task = update(data.projects.as_ref(), identity, &project_id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(task))
}

/// DELETE /projects/{project_id}/tasks?task_id=...
pub async fn delete_task(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    query: web::Query<DeleteTaskQuery>,
) -> Result<HttpResponse, ApiError> {
    delete(data.projects.as_ref(), identity, &project_id, &query.task_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "Task deleted" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permissions::tests::{identity, project};
    use crate::permissions::Denial;
    use crate::store::MemoryStore;

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert_project(&project()).await.unwrap();
        store
    }

    async fn owner_creates(store: &MemoryStore, assignee: Option<&str>) -> Task {
        create(
            store,
            identity("owner"),
            "p1",
            CreateTaskRequest {
                title: "Ship the board".into(),
                assigned_to: assignee.map(str::to_string),
                ..CreateTaskRequest::default()
            },
        )
        .await
        .unwrap()
    }

    fn status_patch(task: &Task, status: TaskStatus) -> UpdateTaskRequest {
        let mut req = UpdateTaskRequest::new(&task.task_id);
        req.status = Some(status);
        req
    }

    async fn stored(store: &MemoryStore, task_id: &str) -> Task {
        store
            .find_project("p1")
            .await
            .unwrap()
            .unwrap()
            .task(task_id)
            .cloned()
            .unwrap()
    }

    #[tokio::test]
    async fn create_sets_defaults_and_resolves_assignee() {
        let store = seeded().await;
        let task = owner_creates(&store, Some("member")).await;
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.version, 1);
        assert_eq!(task.created_by, "owner");
        let assignee = task.assigned_to.clone().unwrap();
        assert_eq!(assignee.email, "member@example.com");
        assert_eq!(stored(&store, &task.task_id).await, task);
    }

    #[tokio::test]
    async fn create_is_owner_only_and_validated() {
        let store = seeded().await;
        let req = CreateTaskRequest {
            title: "x".into(),
            ..CreateTaskRequest::default()
        };
        let err = create(&store, identity("member"), "p1", req.clone()).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(Denial::OwnerOnly(_))));

        let blank = CreateTaskRequest {
            title: "   ".into(),
            ..CreateTaskRequest::default()
        };
        let err = create(&store, identity("owner"), "p1", blank).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let err = create(&store, identity("owner"), "missing", req).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Project")));
    }

    #[tokio::test]
    async fn assignment_outside_the_project_is_rejected() {
        let store = seeded().await;
        let req = CreateTaskRequest {
            title: "x".into(),
            assigned_to: Some("nobody".into()),
            ..CreateTaskRequest::default()
        };
        let err = create(&store, identity("owner"), "p1", req).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let task = owner_creates(&store, None).await;
        let mut patch = UpdateTaskRequest::new(&task.task_id);
        patch.assigned_to = Some(Some("nobody".into()));
        let err = update(&store, identity("owner"), "p1", patch).await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        let mut patch = UpdateTaskRequest::new(&task.task_id);
        patch.assigned_to = Some(Some("viewer".into()));
        let updated = update(&store, identity("owner"), "p1", patch).await.unwrap();
        assert!(updated.is_assigned_to("viewer"));
    }

    #[tokio::test]
    async fn member_owner_verification_scenario() {
        let store = seeded().await;
        let task = owner_creates(&store, Some("member")).await;

        let done = update(&store, identity("member"), "p1", status_patch(&task, TaskStatus::Completed))
            .await
            .unwrap();
        assert_eq!(done.status, TaskStatus::Completed);

        let err = update(&store, identity("member"), "p1", status_patch(&task, TaskStatus::Verified))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(Denial::VerifyRequiresOwner)));

        let before = Utc::now();
        let verified = update(&store, identity("owner"), "p1", status_patch(&task, TaskStatus::Verified))
            .await
            .unwrap();
        assert_eq!(verified.status, TaskStatus::Verified);
        assert_eq!(verified.verified_by.as_deref(), Some("OWNER"));
        assert!(verified.verified_at.unwrap() >= before);

        for status in TaskStatus::ALL {
            let err = update(&store, identity("member"), "p1", status_patch(&task, status))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Forbidden(_)), "status {status}");
        }
        let mut describe = UpdateTaskRequest::new(&task.task_id);
        describe.description = Some(Some("done!".into()));
        let err = update(&store, identity("member"), "p1", describe).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        assert_eq!(stored(&store, &task.task_id).await, verified);
    }

    #[tokio::test]
    async fn illegal_transitions_leave_status_unchanged() {
        let store = seeded().await;
        let task = owner_creates(&store, Some("member")).await;

        for who in ["owner", "member"] {
            let err = update(&store, identity(who), "p1", status_patch(&task, TaskStatus::Verified))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Forbidden(_)));
        }
        assert_eq!(stored(&store, &task.task_id).await.status, TaskStatus::Pending);

        update(&store, identity("owner"), "p1", status_patch(&task, TaskStatus::Completed))
            .await
            .unwrap();
        update(&store, identity("owner"), "p1", status_patch(&task, TaskStatus::Verified))
            .await
            .unwrap();
        let err = update(&store, identity("owner"), "p1", status_patch(&task, TaskStatus::Pending))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(Denial::IllegalTransition { .. })));
        assert_eq!(stored(&store, &task.task_id).await.status, TaskStatus::Verified);
    }

    #[tokio::test]
    async fn non_assignees_cannot_mutate() {
        let store = seeded().await;
        let task = owner_creates(&store, Some("member")).await;
        for who in ["other", "viewer", "nobody"] {
            let err = update(&store, identity(who), "p1", status_patch(&task, TaskStatus::InProgress))
                .await
                .unwrap_err();
            assert!(matches!(err, ApiError::Forbidden(_)), "{who}");
            let err = delete(&store, identity(who), "p1", &task.task_id).await.unwrap_err();
            assert!(matches!(err, ApiError::Forbidden(_)), "{who}");
        }
        let err = list(&store, identity("nobody"), "p1").await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(Denial::NotParticipant)));
        assert_eq!(stored(&store, &task.task_id).await, task);
    }

    #[tokio::test]
    async fn assignee_patch_is_all_or_nothing() {
        let store = seeded().await;
        let task = owner_creates(&store, Some("member")).await;
        let mut req = status_patch(&task, TaskStatus::InProgress);
        req.title = Some("Renamed".into());
        let err = update(&store, identity("member"), "p1", req).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(Denial::FieldRestricted(_))));
        assert_eq!(stored(&store, &task.task_id).await, task);
    }

    #[tokio::test]
    async fn same_status_patch_only_refreshes_timestamps() {
        let store = seeded().await;
        let task = owner_creates(&store, Some("member")).await;
        let same = update(&store, identity("member"), "p1", status_patch(&task, TaskStatus::Pending))
            .await
            .unwrap();
        assert_eq!(same.status, TaskStatus::Pending);
        assert_eq!(same.verified_by, None);
        assert_eq!(same.verified_at, None);
        assert!(same.updated_at >= task.updated_at);
        assert_eq!(same.title, task.title);
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let store = seeded().await;
        let task = owner_creates(&store, Some("member")).await;
        let mut first = status_patch(&task, TaskStatus::InProgress);
        first.expected_version = Some(1);
        update(&store, identity("member"), "p1", first.clone()).await.unwrap();

        first.status = Some(TaskStatus::Completed);
        let err = update(&store, identity("member"), "p1", first).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(stored(&store, &task.task_id).await.status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn stale_version_from_non_assignee_is_still_forbidden() {
        let store = seeded().await;
        let task = owner_creates(&store, Some("member")).await;
        let mut req = status_patch(&task, TaskStatus::InProgress);
        req.expected_version = Some(99);
        let err = update(&store, identity("other"), "p1", req).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(Denial::NotAssignee)));
        assert_eq!(stored(&store, &task.task_id).await, task);
    }

    #[tokio::test]
    async fn repeated_verify_keeps_the_first_stamp() {
        let store = seeded().await;
        let task = owner_creates(&store, Some("member")).await;
        update(&store, identity("owner"), "p1", status_patch(&task, TaskStatus::Completed))
            .await
            .unwrap();
        let verified = update(&store, identity("owner"), "p1", status_patch(&task, TaskStatus::Verified))
            .await
            .unwrap();

        let again = update(&store, identity("owner"), "p1", status_patch(&task, TaskStatus::Verified))
            .await
            .unwrap();
        assert_eq!(again.status, TaskStatus::Verified);
        assert_eq!(again.verified_by, verified.verified_by);
        assert_eq!(again.verified_at, verified.verified_at);
        assert_eq!(again.version, verified.version + 1);
    }

    #[tokio::test]
    async fn empty_patch_is_a_validation_error() {
        let store = seeded().await;
        let task = owner_creates(&store, None).await;
        let err = update(&store, identity("owner"), "p1", UpdateTaskRequest::new(&task.task_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
        let err = update(&store, identity("owner"), "p1", UpdateTaskRequest::new("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Task")));
    }

    #[tokio::test]
    async fn owner_delete_removes_exactly_one_task() {
        let store = seeded().await;
        let keep = owner_creates(&store, None).await;
        let gone = owner_creates(&store, None).await;

        delete(&store, identity("owner"), "p1", &gone.task_id).await.unwrap();
        let tasks = list(&store, identity("owner"), "p1").await.unwrap();
        assert_eq!(tasks, vec![keep]);

        let err = delete(&store, identity("owner"), "p1", &gone.task_id).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("Task")));
    }
}
