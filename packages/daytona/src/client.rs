// ABOUTME: Daytona REST client and the DaytonaApi trait it implements
// ABOUTME: Handles sandbox CRUD, session command execution, and preview link lookup

use crate::error::{DaytonaError, Result};
use crate::types::{
    CreateSandboxRequest, ExecResult, PreviewLink, RemoteSandbox, SessionExecResponse,
};
use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde_json::json;
use tracing::{debug, error};

/// Async interface to the Daytona provisioning service.
///
/// The lifecycle controller and cleanup scheduler only depend on this trait,
/// so tests can substitute an in-memory fake for the real HTTP client.
#[async_trait]
pub trait DaytonaApi: Send + Sync {
    /// Create a new sandbox
    async fn create_sandbox(&self, request: &CreateSandboxRequest) -> Result<RemoteSandbox>;

    /// Fetch a sandbox by ID; `DaytonaError::NotFound` when it does not exist
    async fn get_sandbox(&self, sandbox_id: &str) -> Result<RemoteSandbox>;

    /// List all sandboxes visible to this API key
    async fn list_sandboxes(&self) -> Result<Vec<RemoteSandbox>>;

    /// Delete a sandbox; `DaytonaError::NotFound` when it does not exist
    async fn delete_sandbox(&self, sandbox_id: &str) -> Result<()>;

    /// Open a named command session inside a sandbox
    async fn create_session(&self, sandbox_id: &str, session_id: &str) -> Result<()>;

    /// Close a command session
    async fn delete_session(&self, sandbox_id: &str, session_id: &str) -> Result<()>;

    /// Run a shell command in a session and wait for its result
    async fn exec(&self, sandbox_id: &str, session_id: &str, command: &str) -> Result<ExecResult>;

    /// Get the public preview URL for a port exposed by a sandbox
    async fn preview_link(&self, sandbox_id: &str, port: u16) -> Result<PreviewLink>;
}

/// HTTP client for the Daytona REST API
#[derive(Clone)]
pub struct DaytonaClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl DaytonaClient {
    /// Create a client against the given API base URL (no trailing slash)
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response to a DaytonaError, reading the body for context
    async fn check(&self, response: Response, sandbox_id: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::NOT_FOUND {
            return Err(DaytonaError::NotFound(sandbox_id.to_string()));
        }
        let message = response.text().await.unwrap_or_default();
        error!("Daytona API returned {} for {}: {}", status, sandbox_id, message);
        Err(DaytonaError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl DaytonaApi for DaytonaClient {
    async fn create_sandbox(&self, request: &CreateSandboxRequest) -> Result<RemoteSandbox> {
        debug!("Creating sandbox (snapshot: {:?})", request.snapshot);
        let response = self
            .http
            .post(self.url("/sandbox"))
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;
        let response = self.check(response, "<new>").await?;
        let sandbox: RemoteSandbox = response.json().await?;
        debug!("Created sandbox {}", sandbox.id);
        Ok(sandbox)
    }

    async fn get_sandbox(&self, sandbox_id: &str) -> Result<RemoteSandbox> {
        let response = self
            .http
            .get(self.url(&format!("/sandbox/{}", sandbox_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = self.check(response, sandbox_id).await?;
        Ok(response.json().await?)
    }

    async fn list_sandboxes(&self) -> Result<Vec<RemoteSandbox>> {
        let response = self
            .http
            .get(self.url("/sandbox"))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = self.check(response, "<list>").await?;
        Ok(response.json().await?)
    }

    async fn delete_sandbox(&self, sandbox_id: &str) -> Result<()> {
        debug!("Deleting sandbox {}", sandbox_id);
        let response = self
            .http
            .delete(self.url(&format!("/sandbox/{}", sandbox_id)))
            .bearer_auth(&self.api_key)
            .query(&[("force", "true")])
            .send()
            .await?;
        self.check(response, sandbox_id).await?;
        Ok(())
    }

    async fn create_session(&self, sandbox_id: &str, session_id: &str) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!(
                "/toolbox/{}/toolbox/process/session",
                sandbox_id
            )))
            .bearer_auth(&self.api_key)
            .json(&json!({ "sessionId": session_id }))
            .send()
            .await?;
        self.check(response, sandbox_id).await?;
        Ok(())
    }

    async fn delete_session(&self, sandbox_id: &str, session_id: &str) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!(
                "/toolbox/{}/toolbox/process/session/{}",
                sandbox_id, session_id
            )))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        self.check(response, sandbox_id).await?;
        Ok(())
    }

    async fn exec(&self, sandbox_id: &str, session_id: &str, command: &str) -> Result<ExecResult> {
        let response = self
            .http
            .post(self.url(&format!(
                "/toolbox/{}/toolbox/process/session/{}/exec",
                sandbox_id, session_id
            )))
            .bearer_auth(&self.api_key)
            .json(&json!({ "command": command, "runAsync": false }))
            .send()
            .await?;
        let response = self.check(response, sandbox_id).await?;
        let raw: SessionExecResponse = response.json().await?;
        Ok(ExecResult {
            exit_code: raw.exit_code.unwrap_or(-1),
            output: raw.output.unwrap_or_default(),
        })
    }

    async fn preview_link(&self, sandbox_id: &str, port: u16) -> Result<PreviewLink> {
        let response = self
            .http
            .get(self.url(&format!(
                "/sandbox/{}/ports/{}/preview-url",
                sandbox_id, port
            )))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = self.check(response, sandbox_id).await?;
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_construction() {
        let client = DaytonaClient::new("https://app.daytona.io/api", "key");
        assert_eq!(
            client.url("/sandbox/abc"),
            "https://app.daytona.io/api/sandbox/abc"
        );
    }

    #[test]
    fn test_exec_result_succeeded() {
        let ok = ExecResult {
            exit_code: 0,
            output: String::new(),
        };
        let failed = ExecResult {
            exit_code: 1,
            output: "boom".to_string(),
        };
        assert!(ok.succeeded());
        assert!(!failed.succeeded());
    }
}
