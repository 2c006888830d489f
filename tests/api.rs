use actix_web::{http::StatusCode, test, web, App};
use serde_json::{json, Value};

use plexus_board::app_state::AppState;
use plexus_board::auth::Authentication;
use plexus_board::config::Config;
use plexus_board::routes;

const SECRET: &str = "integration-secret";

fn state() -> AppState {
    let config = Config::from_lookup(|key| match key {
        "STORE_BACKEND" => Some("memory".to_string()),
        "JWT_SECRET" => Some(SECRET.to_string()),
        _ => None,
    })
    .unwrap();
    AppState::in_memory(config)
}

/// Sends a request and returns the status with the parsed JSON body.
macro_rules! send {
    ($app:expr, $req:expr) => {{
        let resp = test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
        (status, value)
    }};
}

macro_rules! register {
    ($app:expr, $name:expr, $email:expr) => {{
        let (status, _) = send!(
            $app,
            test::TestRequest::post()
                .uri("/auth/signup")
                .set_json(json!({ "name": $name, "email": $email, "password": "long enough" }))
        );
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = send!(
            $app,
            test::TestRequest::post()
                .uri("/auth/login")
                .set_json(json!({ "email": $email, "password": "long enough" }))
        );
        assert_eq!(status, StatusCode::OK);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user_id"].as_str().unwrap().to_string(),
        )
    }};
}

fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

#[actix_web::test]
async fn task_lifecycle_over_http() {
    let app = test::init_service(
        App::new()
            .wrap(Authentication::new(SECRET))
            .app_data(web::Data::new(state()))
            .configure(routes::configure),
    )
    .await;

    let (owner, _) = register!(app, "Olive Owner", "olive@example.com");
    let (member, member_id) = register!(app, "Max Member", "max@example.com");

    let (status, project) = send!(
        app,
        test::TestRequest::post()
            .uri("/projects")
            .insert_header(bearer(&owner))
            .set_json(json!({ "name": "Plexus" }))
    );
    assert_eq!(status, StatusCode::CREATED);
    let project_id = project["project_id"].as_str().unwrap().to_string();
    let tasks_uri = format!("/projects/{project_id}/tasks");

    let (status, role) = send!(
        app,
        test::TestRequest::post()
            .uri(&format!("/projects/{project_id}/roles"))
            .insert_header(bearer(&owner))
            .set_json(json!({ "role_name": "Backend", "mandatory_skills": ["rust"], "needed": 1 }))
    );
    assert_eq!(status, StatusCode::CREATED);

    let (status, application) = send!(
        app,
        test::TestRequest::post()
            .uri(&format!("/projects/{project_id}/applications"))
            .insert_header(bearer(&member))
            .set_json(json!({ "role_id": role["role_id"], "message": "hi" }))
    );
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send!(
        app,
        test::TestRequest::post()
            .uri(&format!(
                "/projects/{project_id}/applications/{}/accept",
                application["application_id"].as_str().unwrap()
            ))
            .insert_header(bearer(&owner))
    );
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri(&tasks_uri)
            .insert_header(bearer(&member))
            .set_json(json!({ "title": "Not mine to make" }))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "AUTHORIZATION_ERROR");

    let (status, task) = send!(
        app,
        test::TestRequest::post()
            .uri(&tasks_uri)
            .insert_header(bearer(&owner))
            .set_json(json!({ "title": "Wire the board", "assigned_to": member_id }))
    );
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(task["status"], "pending");
    assert_eq!(task["version"], 1);
    assert_eq!(task["assigned_to"]["email"], "max@example.com");
    let task_id = task["task_id"].as_str().unwrap().to_string();

    let (status, task) = send!(
        app,
        test::TestRequest::patch()
            .uri(&tasks_uri)
            .insert_header(bearer(&member))
            .set_json(json!({ "task_id": task_id, "status": "completed" }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "completed");
    assert_eq!(task["version"], 2);

    let (status, body) = send!(
        app,
        test::TestRequest::patch()
            .uri(&tasks_uri)
            .insert_header(bearer(&member))
            .set_json(json!({ "task_id": task_id, "status": "verified" }))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "AUTHORIZATION_ERROR");

    let (status, body) = send!(
        app,
        test::TestRequest::patch()
            .uri(&tasks_uri)
            .insert_header(bearer(&owner))
            .set_json(json!({ "task_id": task_id, "expected_version": 1, "title": "Stale" }))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");

    let (status, task) = send!(
        app,
        test::TestRequest::patch()
            .uri(&tasks_uri)
            .insert_header(bearer(&owner))
            .set_json(json!({ "task_id": task_id, "expected_version": 2, "status": "verified" }))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(task["status"], "verified");
    assert_eq!(task["verified_by"], "Olive Owner");

    let (status, _) = send!(
        app,
        test::TestRequest::patch()
            .uri(&tasks_uri)
            .insert_header(bearer(&member))
            .set_json(json!({ "task_id": task_id, "status": "pending" }))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send!(
        app,
        test::TestRequest::delete()
            .uri(&format!("{tasks_uri}?task_id={task_id}"))
            .insert_header(bearer(&member))
    );
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send!(
        app,
        test::TestRequest::delete()
            .uri(&format!("{tasks_uri}?task_id={task_id}"))
            .insert_header(bearer(&owner))
    );
    assert_eq!(status, StatusCode::OK);

    let (status, tasks) = send!(
        app,
        test::TestRequest::get()
            .uri(&tasks_uri)
            .insert_header(bearer(&member))
    );
    assert_eq!(status, StatusCode::OK);
    assert_eq!(tasks, json!([]));
}

#[actix_web::test]
async fn requests_without_valid_identity_are_refused() {
    let app = test::init_service(
        App::new()
            .wrap(Authentication::new(SECRET))
            .app_data(web::Data::new(state()))
            .configure(routes::configure),
    )
    .await;

    let (status, body) = send!(app, test::TestRequest::get().uri("/projects/p1/tasks"));
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTHENTICATION_ERROR");

    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/projects/p1/tasks")
            .insert_header(("Authorization", "Bearer not-a-jwt"))
    );
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "AUTHENTICATION_ERROR");

    let (owner, _) = register!(app, "Olive Owner", "olive@example.com");
    let (status, body) = send!(
        app,
        test::TestRequest::get()
            .uri("/projects/missing/tasks")
            .insert_header(bearer(&owner))
    );
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, body) = send!(
        app,
        test::TestRequest::post()
            .uri("/auth/signup")
            .set_json(json!({ "name": "Dup", "email": "OLIVE@example.com", "password": "long enough" }))
    );
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}

#[actix_web::test]
async fn malformed_bearer_tokens_are_answered_by_the_middleware() {
    let app = test::init_service(
        App::new()
            .wrap(Authentication::new(SECRET))
            .app_data(web::Data::new(state()))
            .configure(routes::configure),
    )
    .await;

    for header in ["Bearer ", "Bearer    ", "Bearer a.b.c"] {
        let (status, body) = send!(
            app,
            test::TestRequest::get()
                .uri("/projects")
                .insert_header(("Authorization", header))
        );
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{header:?}");
        assert_eq!(body["code"], "AUTHENTICATION_ERROR");
        assert!(body["message"].as_str().unwrap().starts_with("Invalid token"));
    }

    let (owner, _) = register!(app, "Olive Owner", "olive@example.com");
    let (status, _) = send!(
        app,
        test::TestRequest::get()
            .uri("/projects")
            .insert_header(bearer(&owner))
    );
    assert_eq!(status, StatusCode::OK);
}
