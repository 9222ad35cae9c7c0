//! Uniform result shape, raw-response classification, and poll states.
//!
//! Host replies arrive in several shapes: a pre-normalized result object, a
//! generic JSON mapping, or something opaque. [`RawResponse`] models that
//! union explicitly so a single [`RawResponse::normalize`] owns the mapping
//! into [`ToolResult`] instead of ad hoc type checks at each call site.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Default interval between poll iterations, in seconds.
pub const DEFAULT_POLL_INTERVAL: f64 = 1.0;

/// Lower clamp for host-suggested poll intervals, in seconds.
pub const MIN_POLL_INTERVAL: f64 = 0.1;

/// Upper clamp for host-suggested poll intervals, in seconds.
pub const MAX_POLL_INTERVAL: f64 = 5.0;

/// Status marker field embedded in long-running host replies.
pub const STATUS_FIELD: &str = "_mcp_status";

/// Poll-interval hint field embedded in pending host replies.
pub const INTERVAL_FIELD: &str = "_mcp_poll_interval";

fn default_true() -> bool {
    true
}

/// The uniform outcome shape observed by every caller, regardless of
/// transport or polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct ToolResult {
    /// Whether the operation succeeded.
    #[serde(default = "default_true")]
    pub success: bool,
    /// Optional human-readable message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Optional error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Optional structured payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    /// A business-level failure carrying only a message.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error: None,
            data: None,
        }
    }

    /// A failure carrying a message and diagnostic payload.
    #[must_use]
    pub fn failure_with_data(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            error: None,
            data: Some(data),
        }
    }

    /// A failure produced from host-reported error text.
    #[must_use]
    pub fn host_error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
            data: None,
        }
    }
}

/// Transient classification of one poll response.
///
/// Scoped to a single orchestrated execution; never persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    /// Operation still running; poll again after the suggested interval.
    Pending {
        /// Suggested next-poll interval in seconds, already clamped.
        interval_seconds: f64,
    },
    /// Host marked the operation complete.
    Complete,
    /// Host marked the operation failed.
    Error,
    /// Terminal reply without an explicit completion marker.
    Final,
}

impl PollState {
    /// Classify a raw host payload into a poll state.
    ///
    /// A payload with no status marker is `Pending` when empty and `Final`
    /// otherwise; the latter holds even for tools flagged as polling, which
    /// tolerates hosts that complete synchronously despite the flag.
    #[must_use]
    pub fn interpret(response: &Value) -> Self {
        let Some(map) = response.as_object() else {
            if response.is_null() {
                return Self::Pending {
                    interval_seconds: DEFAULT_POLL_INTERVAL,
                };
            }
            return Self::Final;
        };

        match map.get(STATUS_FIELD) {
            None => {
                if map.is_empty() {
                    Self::Pending {
                        interval_seconds: DEFAULT_POLL_INTERVAL,
                    }
                } else {
                    Self::Final
                }
            }
            Some(status) => match status.as_str() {
                Some("pending") => Self::Pending {
                    interval_seconds: coerce_interval(map.get(INTERVAL_FIELD)),
                },
                Some("complete") => Self::Complete,
                Some("error") => Self::Error,
                _ => Self::Final,
            },
        }
    }
}

/// Coerce a poll-interval hint into seconds, clamped to the allowed range.
///
/// Accepts JSON numbers and numeric strings; anything else falls back to
/// [`DEFAULT_POLL_INTERVAL`].
fn coerce_interval(hint: Option<&Value>) -> f64 {
    let raw = match hint {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    raw.unwrap_or(DEFAULT_POLL_INTERVAL)
        .clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL)
}

/// Union of the shapes a transport response can take.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    /// Already in the uniform result shape; passes through untouched.
    Normalized(ToolResult),
    /// A generic JSON mapping whose fields are mapped into a result.
    Object(Map<String, Value>),
    /// Anything else; wrapped as a failure whose message is its string form.
    Opaque(Value),
}

impl RawResponse {
    /// Classify a raw JSON value into its response variant.
    #[must_use]
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                if is_uniform_shape(&map) {
                    match serde_json::from_value(Value::Object(map.clone())) {
                        Ok(result) => Self::Normalized(result),
                        Err(_) => Self::Object(map),
                    }
                } else {
                    Self::Object(map)
                }
            }
            other => Self::Opaque(other),
        }
    }

    /// Collapse the variant into the uniform result shape.
    ///
    /// For mappings: `success` defaults to `true` but an `_mcp_status` of
    /// `"error"` forces failure; when no `data` field is present the whole
    /// mapping becomes the payload.
    #[must_use]
    pub fn normalize(self) -> ToolResult {
        match self {
            Self::Normalized(result) => result,
            Self::Object(map) => {
                let mut success = map
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                if map.get(STATUS_FIELD).and_then(Value::as_str) == Some("error") {
                    success = false;
                }
                let message = string_field(&map, "message");
                let error = string_field(&map, "error");
                let data = map
                    .get("data")
                    .cloned()
                    .or_else(|| Some(Value::Object(map)));
                ToolResult {
                    success,
                    message,
                    error,
                    data,
                }
            }
            Self::Opaque(value) => {
                let message = match value {
                    Value::String(text) => text,
                    other => other.to_string(),
                };
                ToolResult::failure(message)
            }
        }
    }
}

/// Classify and normalize a raw value in one step.
#[must_use]
pub fn normalize_response(value: Value) -> ToolResult {
    RawResponse::classify(value).normalize()
}

/// Reduce a raw response to a JSON-safe diagnostic payload.
#[must_use]
pub fn diagnostic_payload(value: &Value) -> Value {
    match value {
        Value::Object(_) | Value::Null => value.clone(),
        Value::String(text) => serde_json::json!({ "message": text }),
        other => serde_json::json!({ "message": other.to_string() }),
    }
}

/// Whether a mapping already carries the uniform result shape.
fn is_uniform_shape(map: &Map<String, Value>) -> bool {
    map.get("success").is_some_and(Value::is_boolean)
        && map
            .keys()
            .all(|key| matches!(key.as_str(), "success" | "message" | "error" | "data"))
}

/// Extract an optional textual field, stringifying non-string scalars.
fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => Some(other.to_string()),
    }
}
