//! HTTP client for the remote plugin hub.
//!
//! The hub is the collaborator used when the process-wide transport toggle
//! selects `http`: it relays commands to editor instances it manages and
//! serves per-project tool listings as a registry fallback.

use reqwest::StatusCode;
use serde_json::Value;

use crate::models::tool::ToolDefinition;
use crate::{AppError, Result};

/// Client for one plugin hub deployment.
pub struct PluginHub {
    base_url: String,
    client: reqwest::Client,
}

impl PluginHub {
    /// Create a client for the hub at `base_url` (no trailing slash).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// The configured hub base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Relay one command to an instance through the hub.
    ///
    /// Returns the raw response body; the caller unwraps the shared
    /// `{status, result, error}` envelope so both transports converge on
    /// one shape.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Hub`] on request, status, or decode failures.
    pub async fn send_command_for_instance(
        &self,
        instance: Option<&str>,
        command_type: &str,
        params: &Value,
    ) -> Result<Value> {
        let body = serde_json::json!({
            "instance": instance,
            "type": command_type,
            "params": params,
        });

        let response = self
            .client
            .post(format!("{}/command", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|err| AppError::Hub(format!("command relay failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Hub(format!(
                "hub rejected command '{command_type}': {status}"
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|err| AppError::Hub(format!("undecodable hub response: {err}")))
    }

    /// All tools the hub knows for a project.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Hub`] on request, status, or decode failures.
    pub async fn get_tools_for_project(&self, project_id: &str) -> Result<Vec<ToolDefinition>> {
        let response = self
            .client
            .get(format!("{}/projects/{project_id}/tools", self.base_url))
            .send()
            .await
            .map_err(|err| AppError::Hub(format!("tool listing failed: {err}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(AppError::Hub(format!(
                "hub rejected tool listing for {project_id}: {status}"
            )));
        }

        response
            .json::<Vec<ToolDefinition>>()
            .await
            .map_err(|err| AppError::Hub(format!("undecodable tool listing: {err}")))
    }

    /// One tool definition by name, or `None` when the hub has no entry.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Hub`] on request, status, or decode failures.
    pub async fn get_tool_definition(
        &self,
        project_id: &str,
        tool_name: &str,
    ) -> Result<Option<ToolDefinition>> {
        let response = self
            .client
            .get(format!(
                "{}/projects/{project_id}/tools/{tool_name}",
                self.base_url
            ))
            .send()
            .await
            .map_err(|err| AppError::Hub(format!("tool lookup failed: {err}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(AppError::Hub(format!(
                "hub rejected tool lookup for {tool_name}: {status}"
            )));
        }

        response
            .json::<ToolDefinition>()
            .await
            .map(Some)
            .map_err(|err| AppError::Hub(format!("undecodable tool definition: {err}")))
    }
}
