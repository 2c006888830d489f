// src/project.rs

use actix_web::{web, HttpResponse};
use chrono::Utc;
use log::{debug, info};
use serde::Deserialize;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::auth::normalize_email;
use crate::error::ApiError;
use crate::models::{
    ActorIdentity, Application, ApplicationStatus, Member, Participant, Project, Role,
};
use crate::permissions::{self, Actor, ActorRole, Denial};
use crate::store::{Acceptance, ProjectStore, UserStore};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddPersonnelRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRoleRequest {
    pub role_name: String,
    #[serde(default)]
    pub mandatory_skills: Vec<String>,
    pub needed: u32,
}

#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    pub role_id: String,
    pub message: Option<String>,
}

async fn load_project(store: &dyn ProjectStore, project_id: &str) -> Result<Project, ApiError> {
    store
        .find_project(project_id)
        .await?
        .ok_or(ApiError::NotFound("Project"))
}

fn require_owner(actor: &Actor, action: &'static str) -> Result<(), ApiError> {
    if actor.is_owner() {
        Ok(())
    } else {
        Err(Denial::OwnerOnly(action).into())
    }
}

pub async fn create(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    req: CreateProjectRequest,
) -> Result<Project, ApiError> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(ApiError::validation("project name must not be empty"));
    }
    let now = Utc::now();
    let project = Project {
        project_id: Uuid::new_v4().to_string(),
        owner_id: identity.user_id,
        owner_name: identity.name,
        owner_email: identity.email,
        name: name.to_string(),
        description: req.description,
        authorized_personnel: Vec::new(),
        members: Vec::new(),
        roles: Vec::new(),
        applications: Vec::new(),
        tasks: Vec::new(),
        created_at: now,
        updated_at: now,
    };
    store.insert_project(&project).await?;
    info!("Project created {:?}", project.project_id);
    Ok(project)
}

pub async fn get(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    project_id: &str,
) -> Result<Project, ApiError> {
    let project = load_project(store, project_id).await?;
    permissions::authorize_view(&Actor::resolve(&project, identity))?;
    Ok(project)
}

pub async fn delete(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    project_id: &str,
) -> Result<(), ApiError> {
    let project = load_project(store, project_id).await?;
    require_owner(&Actor::resolve(&project, identity), "delete the project")?;
    if !store.delete_project(project_id).await? {
        return Err(ApiError::NotFound("Project"));
    }
    info!(
        "Project {} deleted with {} tasks",
        project_id,
        project.tasks.len()
    );
    Ok(())
}

/// Grants a registered user read access without a role.
pub async fn add_personnel(
    store: &dyn ProjectStore,
    users: &dyn UserStore,
    identity: ActorIdentity,
    project_id: &str,
    req: AddPersonnelRequest,
) -> Result<Participant, ApiError> {
    let project = load_project(store, project_id).await?;
    require_owner(&Actor::resolve(&project, identity), "add personnel")?;

    let user = users
        .find_user_by_email(&normalize_email(&req.email))
        .await?
        .ok_or(ApiError::NotFound("User"))?;
    if project.participant(&user.user_id).is_some() {
        return Err(ApiError::conflict("user already participates in this project"));
    }

    let person = Participant {
        user_id: user.user_id,
        email: user.email,
        name: user.name,
    };
    if !store.push_personnel(project_id, &person).await? {
        return Err(ApiError::NotFound("Project"));
    }
    info!("Added {} as personnel of {}", person.user_id, project_id);
    Ok(person)
}

pub async fn add_role(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    project_id: &str,
    req: CreateRoleRequest,
) -> Result<Role, ApiError> {
    let project = load_project(store, project_id).await?;
    require_owner(&Actor::resolve(&project, identity), "add roles")?;

    let role_name = req.role_name.trim();
    if role_name.is_empty() {
        return Err(ApiError::validation("role name must not be empty"));
    }
    if req.needed == 0 {
        return Err(ApiError::validation("a role needs at least one seat"));
    }
    let role = Role {
        role_id: Uuid::new_v4().to_string(),
        role_name: role_name.to_string(),
        mandatory_skills: req.mandatory_skills,
        needed: req.needed,
        filled: 0,
    };
    if !store.push_role(project_id, &role).await? {
        return Err(ApiError::NotFound("Project"));
    }
    Ok(role)
}

pub async fn apply(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    project_id: &str,
    req: ApplyRequest,
) -> Result<Application, ApiError> {
    let project = load_project(store, project_id).await?;
    let actor = Actor::resolve(&project, identity);
    if matches!(actor.role, ActorRole::Owner | ActorRole::TeamMember) {
        return Err(ApiError::conflict("already part of the project team"));
    }

    let role = project.role(&req.role_id).ok_or(ApiError::NotFound("Role"))?;
    if role.is_full() {
        return Err(ApiError::conflict("role is already filled"));
    }
    let duplicate = project.applications.iter().any(|a| {
        a.user_id == actor.identity.user_id
            && a.role_id == role.role_id
            && a.status == ApplicationStatus::Pending
    });
    if duplicate {
        return Err(ApiError::conflict("application already pending"));
    }

    let application = Application {
        application_id: Uuid::new_v4().to_string(),
        user_id: actor.identity.user_id,
        email: actor.identity.email,
        name: actor.identity.name,
        role_id: role.role_id.clone(),
        message: req.message,
        status: ApplicationStatus::Pending,
        created_at: Utc::now(),
    };
    if !store.push_application(project_id, &application).await? {
        return Err(ApiError::NotFound("Project"));
    }
    debug!("Application {} filed", application.application_id);
    Ok(application)
}

/// Turns a pending application into membership. The role's seat count is
/// re-checked inside the store update, so two racing accepts cannot push
/// `filled` past `needed`.
pub async fn accept(
    store: &dyn ProjectStore,
    identity: ActorIdentity,
    project_id: &str,
    application_id: &str,
) -> Result<Member, ApiError> {
    let project = load_project(store, project_id).await?;
    require_owner(&Actor::resolve(&project, identity), "accept applications")?;

    let application = project
        .application(application_id)
        .ok_or(ApiError::NotFound("Application"))?;
    if application.status != ApplicationStatus::Pending {
        return Err(ApiError::conflict("application was already accepted"));
    }
    if project.is_member(&application.user_id) {
        return Err(ApiError::conflict("applicant is already a team member"));
    }
    let role = project
        .role(&application.role_id)
        .ok_or(ApiError::NotFound("Role"))?;
    if role.is_full() {
        return Err(ApiError::conflict("role is already filled"));
    }

    let now = Utc::now();
    let member = Member {
        user_id: application.user_id.clone(),
        email: application.email.clone(),
        name: application.name.clone(),
        role_id: role.role_id.clone(),
        joined_at: now,
    };
    let acceptance = Acceptance {
        application_id: application.application_id.clone(),
        role_id: role.role_id.clone(),
        observed_filled: role.filled,
        member: member.clone(),
        at: now,
    };
    if !store.accept_application(project_id, &acceptance).await? {
        return Err(ApiError::conflict(
            "project changed while accepting, reload and retry",
        ));
    }
    info!(
        "{} joined project {} as {}",
        member.user_id, project_id, role.role_name
    );
    Ok(member)
}

/// POST /projects
pub async fn create_project(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    payload: web::Json<CreateProjectRequest>,
) -> Result<HttpResponse, ApiError> {
    let project = create(data.projects.as_ref(), identity, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(project))
}

/// GET /projects
pub async fn list_projects(
    identity: ActorIdentity,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    let projects = data
        .projects
        .list_projects_for_user(&identity.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(projects))
}

/// GET /projects/{project_id}
pub async fn get_project(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let project = get(data.projects.as_ref(), identity, &project_id).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// DELETE /projects/{project_id}
pub async fn delete_project(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    delete(data.projects.as_ref(), identity, &project_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "Project deleted" })))
}

/// POST /projects/{project_id}/personnel
pub async fn add_project_personnel(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    payload: web::Json<AddPersonnelRequest>,
) -> Result<HttpResponse, ApiError> {
    let person = add_personnel(
        data.projects.as_ref(),
        data.users.as_ref(),
        identity,
        &project_id,
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Created().json(person))
}

/// POST /projects/{project_id}/roles
pub async fn create_role(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    payload: web::Json<CreateRoleRequest>,
) -> Result<HttpResponse, ApiError> {
    let role = add_role(data.projects.as_ref(), identity, &project_id, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(role))
}

/// POST /projects/{project_id}/applications
pub async fn apply_to_role(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    payload: web::Json<ApplyRequest>,
) -> Result<HttpResponse, ApiError> {
    let application =
        apply(data.projects.as_ref(), identity, &project_id, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(application))
}

/// POST /projects/{project_id}/applications/{application_id}/accept
pub async fn accept_application(
    identity: ActorIdentity,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (project_id, application_id) = path.into_inner();
    let member = accept(data.projects.as_ref(), identity, &project_id, &application_id).await?;
    Ok(HttpResponse::Ok().json(member))
}
