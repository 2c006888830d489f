use actix_web::web;

use crate::error::ApiError;

use crate::auth::{login, signup};
use crate::project::{
    accept_application, add_project_personnel, apply_to_role, create_project, create_role,
    delete_project, get_project, list_projects,
};
use crate::tasks::{create_task, delete_task, list_tasks, update_task};

/// Registers every HTTP route. Shared by the binary and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| ApiError::validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| ApiError::validation(err.to_string()).into()),
    )
    .service(
        web::scope("/auth")
            .route("/signup", web::post().to(signup))
            .route("/login", web::post().to(login)),
    )
    .service(
        web::scope("/projects")
            .route("", web::post().to(create_project))
            .route("", web::get().to(list_projects))
            .route("/{project_id}", web::get().to(get_project))
            .route("/{project_id}", web::delete().to(delete_project))
            .route("/{project_id}/personnel", web::post().to(add_project_personnel))
            .route("/{project_id}/roles", web::post().to(create_role))
            .service(
                web::scope("/{project_id}/applications")
                    .route("", web::post().to(apply_to_role))
                    .route(
                        "/{application_id}/accept",
                        web::post().to(accept_application),
                    ),
            )
            .service(
                web::scope("/{project_id}/tasks")
                    .route("", web::get().to(list_tasks))
                    .route("", web::post().to(create_task))
                    .route("", web::patch().to(update_task))
                    .route("", web::delete().to(delete_task)),
            ),
    );
}
