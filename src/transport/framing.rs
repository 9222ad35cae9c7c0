//! Length-prefixed JSON framing for Unity local channels.
//!
//! Wraps [`tokio_util::codec::LengthDelimitedCodec`] configured for the
//! UnityMCP wire format: an 8-byte big-endian unsigned length prefix
//! followed by exactly that many UTF-8 bytes of JSON, identical for
//! requests and responses on both channel kinds.
//!
//! # Usage
//!
//! Use [`FrameCodec`] as the codec parameter for
//! [`tokio_util::codec::Framed`] over a connected local-socket stream.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

use crate::{AppError, Result};

/// Maximum frame body accepted on the inbound stream: 64 MiB.
///
/// Frames whose declared length exceeds this limit cause
/// [`FrameCodec::decode`] to return [`AppError::Codec`], protecting the
/// process from allocating unbounded memory for a single response.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// One framed command sent to a Unity instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRequest {
    /// Command type understood by the host dispatcher.
    #[serde(rename = "type")]
    pub command_type: String,
    /// Command parameters; always an object on the wire.
    pub params: Value,
}

impl CommandRequest {
    /// Build a request, substituting an empty object for null params.
    #[must_use]
    pub fn new(command_type: impl Into<String>, params: Value) -> Self {
        let params = if params.is_null() {
            Value::Object(serde_json::Map::new())
        } else {
            params
        };
        Self {
            command_type: command_type.into(),
            params,
        }
    }
}

/// The response envelope produced by the host for every framed exchange.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HostResponse {
    /// `"error"` on failure; any other value (or absence) means success.
    #[serde(default)]
    pub status: Option<String>,
    /// Payload on success.
    #[serde(default)]
    pub result: Option<Value>,
    /// Error text on failure.
    #[serde(default)]
    pub error: Option<String>,
}

/// Unwrap a response envelope into its payload.
///
/// A `status` of `"error"` becomes [`AppError::Host`] carrying the host's
/// error text. The literal `ping` command is special-cased: its reply is
/// synthesized locally as `{"message": "pong"}` rather than unwrapping
/// `result`.
///
/// # Errors
///
/// Returns [`AppError::Codec`] when the body is not an envelope object and
/// [`AppError::Host`] when the host reports a domain error.
pub fn unwrap_envelope(body: Value, command_type: &str) -> Result<Value> {
    let envelope: HostResponse = serde_json::from_value(body)
        .map_err(|err| AppError::Codec(format!("malformed response envelope: {err}")))?;

    if envelope.status.as_deref() == Some("error") {
        return Err(AppError::Host(
            envelope
                .error
                .unwrap_or_else(|| "unspecified host error".into()),
        ));
    }

    if command_type == "ping" {
        return Ok(serde_json::json!({ "message": "pong" }));
    }

    Ok(envelope
        .result
        .unwrap_or_else(|| Value::Object(serde_json::Map::new())))
}

/// Length-prefixed JSON codec for Unity local channels.
///
/// Delegates framing to [`LengthDelimitedCodec`] with an 8-byte big-endian
/// length field and a fixed [`MAX_FRAME_BYTES`] limit; each frame body is
/// parsed as one JSON value.
#[derive(Debug)]
pub struct FrameCodec(LengthDelimitedCodec);

impl FrameCodec {
    /// Create a new codec with the default [`MAX_FRAME_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(
            LengthDelimitedCodec::builder()
                .big_endian()
                .length_field_length(8)
                .max_frame_length(MAX_FRAME_BYTES)
                .new_codec(),
        )
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Value;
    type Error = AppError;

    /// Decode the next complete frame from `src`.
    ///
    /// Returns `Ok(None)` while the length prefix or body is still partial.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some(frame) = self.0.decode(src).map_err(map_codec_error)? else {
            return Ok(None);
        };
        serde_json::from_slice(&frame)
            .map(Some)
            .map_err(|err| AppError::Codec(format!("malformed frame body: {err}")))
    }
}

impl Encoder<CommandRequest> for FrameCodec {
    type Error = AppError;

    /// Encode `item` as a length-prefixed JSON frame into `dst`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Codec`] if serialization fails and
    /// [`AppError::Io`] on underlying I/O failures.
    fn encode(&mut self, item: CommandRequest, dst: &mut BytesMut) -> Result<()> {
        let body = serde_json::to_vec(&item)
            .map_err(|err| AppError::Codec(format!("failed to serialize request: {err}")))?;
        self.0
            .encode(Bytes::from(body), dst)
            .map_err(map_codec_error)
    }
}

// ── Private helper ────────────────────────────────────────────────────────────

/// Map a [`LengthDelimitedCodec`] I/O error to an [`AppError`].
fn map_codec_error(err: std::io::Error) -> AppError {
    if err.kind() == std::io::ErrorKind::InvalidData {
        AppError::Codec(format!("frame rejected: {err}"))
    } else {
        AppError::Io(err.to_string())
    }
}
