//! HTTP client for the task endpoints, used by the board controller.

use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::error::ErrorBody;
use crate::models::{CreateTaskRequest, Project, Task, UpdateTaskRequest};

/// Server error classes, mirroring the `code` field of error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    Validation,
    NotFound,
    Conflict,
    TransientIo,
    Internal,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("server rejected the request ({status} {code}): {message}")]
    Rejected {
        status: u16,
        code: String,
        message: String,
    },
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Rejected { status, code, .. } => match code.as_str() {
                "AUTHENTICATION_ERROR" => ErrorKind::Authentication,
                "AUTHORIZATION_ERROR" => ErrorKind::Authorization,
                "VALIDATION_ERROR" => ErrorKind::Validation,
                "NOT_FOUND" => ErrorKind::NotFound,
                "CONFLICT" => ErrorKind::Conflict,
                "TRANSIENT_IO_ERROR" => ErrorKind::TransientIo,
                "INTERNAL_ERROR" => ErrorKind::Internal,
                _ => kind_from_status(*status),
            },
            ClientError::Transport(_) => ErrorKind::TransientIo,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

fn kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::Validation,
        401 => ErrorKind::Authentication,
        403 => ErrorKind::Authorization,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::Conflict,
        502..=504 => ErrorKind::TransientIo,
        _ => ErrorKind::Internal,
    }
}

/// Task operations as seen from a client.
#[async_trait]
pub trait TaskApi: Send + Sync {
    async fn fetch_project(&self, project_id: &str) -> Result<Project, ClientError>;

    async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, ClientError>;

    async fn create_task(
        &self,
        project_id: &str,
        req: &CreateTaskRequest,
    ) -> Result<Task, ClientError>;

    async fn update_task(
        &self,
        project_id: &str,
        req: &UpdateTaskRequest,
    ) -> Result<Task, ClientError>;

    async fn delete_task(&self, project_id: &str, task_id: &str) -> Result<(), ClientError>;
}

pub struct HttpTaskApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpTaskApi {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn project_url(&self, project_id: &str) -> String {
        format!("{}/projects/{}", self.base_url, project_id)
    }

    fn tasks_url(&self, project_id: &str) -> String {
        format!("{}/tasks", self.project_url(project_id))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = check(request.bearer_auth(&self.token).send().await?).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Turns a non-2xx response into [`ClientError::Rejected`].
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.json::<ErrorBody>().await.unwrap_or_else(|_| ErrorBody {
        code: String::new(),
        message: status
            .canonical_reason()
            .unwrap_or("unexpected response")
            .to_string(),
    });
    debug!("Request failed with {}: {}", status, body.message);
    Err(ClientError::Rejected {
        status: status.as_u16(),
        code: body.code,
        message: body.message,
    })
}

#[async_trait]
impl TaskApi for HttpTaskApi {
    async fn fetch_project(&self, project_id: &str) -> Result<Project, ClientError> {
        self.send(self.client.get(self.project_url(project_id))).await
    }

    async fn list_tasks(&self, project_id: &str) -> Result<Vec<Task>, ClientError> {
        self.send(self.client.get(self.tasks_url(project_id))).await
    }

    async fn create_task(
        &self,
        project_id: &str,
        req: &CreateTaskRequest,
    ) -> Result<Task, ClientError> {
        self.send(self.client.post(self.tasks_url(project_id)).json(req))
            .await
    }

    async fn update_task(
        &self,
        project_id: &str,
        req: &UpdateTaskRequest,
    ) -> Result<Task, ClientError> {
        self.send(self.client.patch(self.tasks_url(project_id)).json(req))
            .await
    }

    async fn delete_task(&self, project_id: &str, task_id: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .delete(self.tasks_url(project_id))
            .query(&[("task_id", task_id)])
            .bearer_auth(&self.token);
        check(request.send().await?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(status: u16, code: &str) -> ClientError {
        ClientError::Rejected {
            status,
            code: code.into(),
            message: String::new(),
        }
    }

    #[test]
    fn kind_follows_code_then_status() {
        assert_eq!(rejected(403, "AUTHORIZATION_ERROR").kind(), ErrorKind::Authorization);
        assert_eq!(rejected(409, "CONFLICT").kind(), ErrorKind::Conflict);
        assert_eq!(rejected(503, "TRANSIENT_IO_ERROR").kind(), ErrorKind::TransientIo);
        assert_eq!(rejected(404, "").kind(), ErrorKind::NotFound);
        assert_eq!(rejected(502, "").kind(), ErrorKind::TransientIo);
        assert!(rejected(404, "NOT_FOUND").is_not_found());
    }

    #[test]
    fn urls_are_built_from_base() {
        let api = HttpTaskApi::new("http://localhost:8080/", "t", Duration::from_secs(5)).unwrap();
        assert_eq!(api.project_url("p1"), "http://localhost:8080/projects/p1");
        assert_eq!(api.tasks_url("p1"), "http://localhost:8080/projects/p1/tasks");
    }
}
