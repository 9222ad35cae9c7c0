//! Tool execution: definition resolution, dispatch, and the bounded poll
//! loop that turns long-running host operations into one terminal result.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, info_span, Instrument};

use crate::models::response::{
    diagnostic_payload, normalize_response, PollState, ToolResult, DEFAULT_POLL_INTERVAL,
    INTERVAL_FIELD, MAX_POLL_INTERVAL, STATUS_FIELD,
};
use crate::registry::ToolRegistry;
use crate::transport::selector::CommandPort;
use crate::{AppError, Result};

/// Wall-clock budget for one polled execution, in seconds.
pub const MAX_POLL_SECONDS: u64 = 600;

/// Drives one tool execution from definition lookup to terminal result.
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    transport: Arc<dyn CommandPort>,
}

impl ToolExecutor {
    /// Create an executor over the given registry and transport.
    #[must_use]
    pub fn new(registry: Arc<ToolRegistry>, transport: Arc<dyn CommandPort>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Execute a tool and return the uniform result shape.
    ///
    /// An unresolvable definition (after one forced sync retry) and a poll
    /// deadline are business-level failures returned inside the result;
    /// host-reported domain errors are folded in the same way.
    ///
    /// # Errors
    ///
    /// Returns the transport's typed error when the initial dispatch fails
    /// at the channel level (`Connection`, `Hub`, `Validation`).
    pub async fn execute(
        &self,
        project_id: &str,
        tool_name: &str,
        instance: Option<&str>,
        params: Value,
    ) -> Result<ToolResult> {
        let span = info_span!("execute_tool", project_id, tool = tool_name);
        async move {
            let params = if params.is_null() {
                Value::Object(Map::new())
            } else {
                params
            };

            let Some(definition) = self.resolve_definition(project_id, tool_name).await else {
                return Ok(ToolResult::failure(format!(
                    "Tool '{tool_name}' not found for project {project_id}"
                )));
            };

            let response = match self
                .transport
                .send_to_instance(instance, tool_name, params.clone())
                .await
            {
                Ok(response) => response,
                Err(AppError::Host(text)) => return Ok(ToolResult::host_error(text)),
                Err(err) => return Err(err),
            };

            if !definition.requires_polling {
                let result = normalize_response(response);
                info!(success = result.success, "immediate result");
                return Ok(result);
            }

            let action = if definition.poll_action.is_empty() {
                "status"
            } else {
                definition.poll_action.as_str()
            };
            let result = self
                .poll_until_complete(tool_name, instance, params, response, action)
                .await;
            info!(success = result.success, "polled result");
            Ok(result)
        }
        .instrument(span)
        .await
    }

    /// Look up the definition, forcing one sync retry on a miss.
    async fn resolve_definition(
        &self,
        project_id: &str,
        tool_name: &str,
    ) -> Option<crate::models::tool::ToolDefinition> {
        if let Some(definition) = self.registry.get_tool_definition(project_id, tool_name).await {
            return Some(definition);
        }
        self.registry.sync_all_instances(true).await;
        self.registry.get_tool_definition(project_id, tool_name).await
    }

    /// Drive the poll loop to a terminal outcome within the deadline.
    ///
    /// Transient transport failures during an iteration are not fatal:
    /// they are replaced by a synthetic pending response whose interval is
    /// the previous one doubled, clamped to the allowed range, keeping the
    /// loop alive through editor domain reloads and similar glitches.
    async fn poll_until_complete(
        &self,
        tool_name: &str,
        instance: Option<&str>,
        initial_params: Value,
        initial_response: Value,
        poll_action: &str,
    ) -> ToolResult {
        let mut poll_params = match initial_params {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        poll_params.insert("action".into(), Value::String(poll_action.to_owned()));
        let poll_params = Value::Object(poll_params);

        let deadline = Instant::now() + Duration::from_secs(MAX_POLL_SECONDS);
        let mut response = initial_response;
        let mut interval = DEFAULT_POLL_INTERVAL;

        loop {
            match PollState::interpret(&response) {
                PollState::Complete | PollState::Error | PollState::Final => {
                    return normalize_response(response);
                }
                PollState::Pending { interval_seconds } => {
                    interval = interval_seconds;
                }
            }

            if Instant::now() > deadline {
                return ToolResult::failure_with_data(
                    format!("Timeout waiting for {tool_name} to complete"),
                    diagnostic_payload(&response),
                );
            }

            tokio::time::sleep(Duration::from_secs_f64(interval)).await;

            response = match self
                .transport
                .send_to_instance(instance, tool_name, poll_params.clone())
                .await
            {
                Ok(next) => next,
                Err(err) => {
                    debug!(tool = tool_name, %err, "poll iteration failed, will retry");
                    let widened = (interval * 2.0)
                        .max(DEFAULT_POLL_INTERVAL)
                        .min(MAX_POLL_INTERVAL);
                    serde_json::json!({
                        STATUS_FIELD: "pending",
                        INTERVAL_FIELD: widened,
                        "message": format!("Retrying after transient error: {err}"),
                    })
                }
            };
        }
    }
}
