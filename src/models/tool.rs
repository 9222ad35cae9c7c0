//! Tool definitions and introspection-descriptor parsing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{AppError, Result};

fn default_param_type() -> String {
    "string".into()
}

fn default_poll_action() -> String {
    "status".into()
}

fn default_true() -> bool {
    true
}

/// One declared parameter of a host-executable tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ToolParameter {
    /// Parameter name.
    pub name: String,
    /// Optional human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared type tag; hosts default to `string`.
    #[serde(rename = "type", default = "default_param_type")]
    pub param_type: String,
    /// Whether the parameter must be supplied.
    #[serde(default = "default_true")]
    pub required: bool,
    /// Optional default value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

/// A named, host-executable operation with its declared schema.
///
/// Definitions are owned exclusively by the tool registry and replaced
/// wholesale on re-registration; there is no partial field merge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ToolDefinition {
    /// Tool name, unique within a project.
    pub name: String,
    /// Optional human description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether the tool returns structured output.
    #[serde(default = "default_true")]
    pub structured_output: bool,
    /// Whether executions must be driven through the poll loop.
    #[serde(default)]
    pub requires_polling: bool,
    /// Command action used for poll iterations.
    #[serde(default = "default_poll_action")]
    pub poll_action: String,
    /// Ordered parameter list.
    #[serde(default)]
    pub parameters: Vec<ToolParameter>,
}

impl ToolDefinition {
    /// Parse a descriptor returned by the `list_csharp_tools` introspection
    /// command into a definition, applying host-side defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` when the descriptor is not an object
    /// or lacks a `name` field.
    pub fn from_descriptor(descriptor: &Value) -> Result<Self> {
        if !descriptor.is_object() {
            return Err(AppError::Validation(
                "tool descriptor must be an object".into(),
            ));
        }
        if descriptor.get("name").and_then(Value::as_str).is_none() {
            return Err(AppError::Validation(
                "tool descriptor is missing 'name'".into(),
            ));
        }
        serde_json::from_value(descriptor.clone())
            .map_err(|err| AppError::Validation(format!("invalid tool descriptor: {err}")))
    }

    /// Whether the descriptor opts into automatic registration.
    ///
    /// Absent means yes; only an explicit `false` suppresses registration.
    #[must_use]
    pub fn auto_register(descriptor: &Value) -> bool {
        descriptor
            .get("auto_register")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }
}
