use async_trait::async_trait;
use chrono::Utc;
use futures_util::TryStreamExt;
use log::{debug, info};
use mongodb::bson::{doc, to_bson, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions, ReturnDocument};
use mongodb::{Client, Collection, Database, IndexModel};

use super::{Acceptance, ProjectStore, StoreError, TaskUpdate, UserStore};
use crate::models::{Application, Participant, Project, Role, Task, TaskChanges, User};

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed store: one `projects` document per project, one `users`
/// document per account.
pub struct MongoStore {
    pub client: Client,
    pub db: Database,
}

impl MongoStore {
    pub async fn init(uri: &str, db_name: &str) -> Result<Self, StoreError> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        let store = MongoStore { client, db };
        store.ensure_indexes().await?;
        info!("Connected to MongoDB database {}", db_name);
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        let unique = IndexOptions::builder().unique(true).build();
        self.users()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique.clone())
                    .build(),
            )
            .await?;
        self.projects()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "project_id": 1 })
                    .options(unique)
                    .build(),
            )
            .await?;
        Ok(())
    }

    fn projects(&self) -> Collection<Project> {
        self.db.collection::<Project>("projects")
    }

    fn users(&self) -> Collection<User> {
        self.db.collection::<User>("users")
    }

    /// `$push` onto one of the project's embedded arrays.
    async fn push(&self, project_id: &str, field: &str, value: Bson) -> Result<bool, StoreError> {
        let mut push = Document::new();
        push.insert(field, value);
        let update = doc! {
            "$push": push,
            "$set": { "updated_at": to_bson(&Utc::now())? },
        };
        let res = self
            .projects()
            .update_one(doc! { "project_id": project_id }, update)
            .await?;
        Ok(res.matched_count == 1)
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY
    )
}

/// `$set` document for the task matched by the `t` array filter.
fn task_set_document(changes: &TaskChanges) -> Result<Document, StoreError> {
    let mut set = Document::new();
    if let Some(title) = &changes.title {
        set.insert("tasks.$[t].title", title.clone());
    }
    if let Some(description) = &changes.description {
        set.insert("tasks.$[t].description", to_bson(description)?);
    }
    if let Some(priority) = &changes.priority {
        set.insert("tasks.$[t].priority", to_bson(priority)?);
    }
    if let Some(status) = &changes.status {
        set.insert("tasks.$[t].status", to_bson(status)?);
    }
    if let Some(due_date) = &changes.due_date {
        set.insert("tasks.$[t].due_date", to_bson(due_date)?);
    }
    if let Some(assigned_to) = &changes.assigned_to {
        set.insert("tasks.$[t].assigned_to", to_bson(assigned_to)?);
    }
    if let Some(verified_by) = &changes.verified_by {
        set.insert("tasks.$[t].verified_by", verified_by.clone());
    }
    if let Some(verified_at) = &changes.verified_at {
        set.insert("tasks.$[t].verified_at", to_bson(verified_at)?);
    }
    let updated_at = to_bson(&changes.updated_at)?;
    set.insert("tasks.$[t].updated_at", updated_at.clone());
    set.insert("updated_at", updated_at);
    Ok(set)
}

#[async_trait]
impl ProjectStore for MongoStore {
    async fn insert_project(&self, project: &Project) -> Result<(), StoreError> {
        self.projects().insert_one(project).await?;
        Ok(())
    }

    async fn find_project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        Ok(self
            .projects()
            .find_one(doc! { "project_id": project_id })
            .await?)
    }

    async fn list_projects_for_user(&self, user_id: &str) -> Result<Vec<Project>, StoreError> {
        let filter = doc! {
            "$or": [
                { "owner_id": user_id },
                { "members.user_id": user_id },
                { "authorized_personnel.user_id": user_id },
            ]
        };
        let projects: Vec<Project> = self.projects().find(filter).await?.try_collect().await?;
        Ok(projects)
    }

    async fn delete_project(&self, project_id: &str) -> Result<bool, StoreError> {
        let res = self
            .projects()
            .delete_one(doc! { "project_id": project_id })
            .await?;
        Ok(res.deleted_count == 1)
    }

    async fn push_personnel(
        &self,
        project_id: &str,
        person: &Participant,
    ) -> Result<bool, StoreError> {
        self.push(project_id, "authorized_personnel", to_bson(person)?)
            .await
    }

    async fn push_role(&self, project_id: &str, role: &Role) -> Result<bool, StoreError> {
        self.push(project_id, "roles", to_bson(role)?).await
    }

    async fn push_application(
        &self,
        project_id: &str,
        application: &Application,
    ) -> Result<bool, StoreError> {
        self.push(project_id, "applications", to_bson(application)?)
            .await
    }

    async fn accept_application(
        &self,
        project_id: &str,
        acceptance: &Acceptance,
    ) -> Result<bool, StoreError> {
        let filter = doc! {
            "project_id": project_id,
            "roles": { "$elemMatch": {
                "role_id": &acceptance.role_id,
                "filled": i64::from(acceptance.observed_filled),
            } },
            "applications": { "$elemMatch": {
                "application_id": &acceptance.application_id,
                "status": "pending",
            } },
            "members.user_id": { "$ne": &acceptance.member.user_id },
        };
        let update = doc! {
            "$inc": { "roles.$[r].filled": 1 },
            "$set": {
                "applications.$[a].status": "accepted",
                "updated_at": to_bson(&acceptance.at)?,
            },
            "$push": { "members": to_bson(&acceptance.member)? },
        };
        let res = self
            .projects()
            .update_one(filter, update)
            .array_filters(vec![
                doc! { "r.role_id": &acceptance.role_id },
                doc! { "a.application_id": &acceptance.application_id },
            ])
            .await?;
        Ok(res.modified_count == 1)
    }

    async fn push_task(&self, project_id: &str, task: &Task) -> Result<bool, StoreError> {
        self.push(project_id, "tasks", to_bson(task)?).await
    }

    async fn update_task(
        &self,
        project_id: &str,
        task_id: &str,
        expected_version: i64,
        changes: &TaskChanges,
    ) -> Result<TaskUpdate, StoreError> {
        let filter = doc! {
            "project_id": project_id,
            "tasks": { "$elemMatch": { "task_id": task_id, "version": expected_version } },
        };
        let update = doc! {
            "$set": task_set_document(changes)?,
            "$inc": { "tasks.$[t].version": 1_i64 },
        };
        debug!("Updating task {} in project {}: {}", task_id, project_id, update);
        let updated = self
            .projects()
            .find_one_and_update(filter, update)
            .array_filters(vec![doc! { "t.task_id": task_id }])
            .return_document(ReturnDocument::After)
            .await?;

        if let Some(project) = updated {
            return Ok(project
                .task(task_id)
                .cloned()
                .map_or(TaskUpdate::Missing, TaskUpdate::Updated));
        }
        // Nothing matched: tell a vanished task apart from a stale version.
        let current = self
            .find_project(project_id)
            .await?
            .and_then(|p| p.task(task_id).map(|t| t.version));
        Ok(match current {
            Some(current) => TaskUpdate::VersionMismatch { current },
            None => TaskUpdate::Missing,
        })
    }

    async fn pull_task(&self, project_id: &str, task_id: &str) -> Result<bool, StoreError> {
        let res = self
            .projects()
            .update_one(
                doc! { "project_id": project_id, "tasks.task_id": task_id },
                doc! {
                    "$pull": { "tasks": { "task_id": task_id } },
                    "$set": { "updated_at": to_bson(&Utc::now())? },
                },
            )
            .await?;
        Ok(res.modified_count == 1)
    }
}

#[async_trait]
impl UserStore for MongoStore {
    async fn insert_user(&self, user: &User) -> Result<bool, StoreError> {
        match self.users().insert_one(user).await {
            Ok(_) => Ok(true),
            Err(e) if is_duplicate_key(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users().find_one(doc! { "email": email }).await?)
    }
}
