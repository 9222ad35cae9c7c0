//! Framed local-channel connection to one Unity editor instance.
//!
//! Each [`HostConnection`] owns one byte-stream channel — a named pipe on
//! Windows (`\\.\pipe\UnityMCP.<hash>`) or a Unix domain socket elsewhere
//! (`/tmp/UnityMCP.<hash>.sock`) — via the `interprocess` crate. The wire
//! protocol carries no request identifiers and cannot multiplex, so every
//! exchange (write then read) runs under a per-connection lock: at most one
//! outstanding request per connection at any time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use interprocess::local_socket::tokio::{prelude::*, Stream};
use interprocess::local_socket::GenericFilePath;
use serde_json::Value;
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::transport::framing::{unwrap_envelope, CommandRequest, FrameCodec};
use crate::{AppError, Result};

/// Maximum handshake banner read after connecting, in bytes.
///
/// The host greets each connection with `WELCOME UNITY-MCP 1 FRAMING=1\n`;
/// the banner is drained and discarded, never parsed, so it cannot corrupt
/// the first framed exchange.
const BANNER_BYTES: usize = 64;

/// Build the platform channel endpoint for a project hash.
#[cfg(unix)]
fn endpoint_for(channel_dir: &Path, project_hash: &str) -> String {
    channel_dir
        .join(format!("UnityMCP.{project_hash}.sock"))
        .to_string_lossy()
        .into_owned()
}

/// Build the platform channel endpoint for a project hash.
#[cfg(windows)]
fn endpoint_for(_channel_dir: &Path, project_hash: &str) -> String {
    format!(r"\\.\pipe\UnityMCP.{project_hash}")
}

/// Whether the channel endpoint currently exists.
///
/// Windows named pipes cannot be probed cheaply without opening them, so
/// absence is detected by the connect attempt itself there.
#[cfg(unix)]
fn endpoint_exists(endpoint: &str) -> bool {
    Path::new(endpoint).exists()
}

#[cfg(windows)]
fn endpoint_exists(_endpoint: &str) -> bool {
    true
}

/// One framed connection to one Unity editor instance.
pub struct HostConnection {
    project_hash: String,
    endpoint: String,
    stream: Mutex<Option<Framed<Stream, FrameCodec>>>,
}

impl HostConnection {
    /// Create a disconnected handle for the given project hash.
    ///
    /// `channel_dir` locates socket files on Unix and is ignored on Windows,
    /// where the pipe namespace is fixed.
    #[must_use]
    pub fn new(channel_dir: &Path, project_hash: impl Into<String>) -> Self {
        let project_hash = project_hash.into();
        let endpoint = endpoint_for(channel_dir, &project_hash);
        Self {
            project_hash,
            endpoint,
            stream: Mutex::new(None),
        }
    }

    /// The channel endpoint this connection targets.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// The project hash this connection targets.
    #[must_use]
    pub fn project_hash(&self) -> &str {
        &self.project_hash
    }

    /// Establish the channel if not already connected.
    ///
    /// Idempotent; an absent or unreachable endpoint yields `false` rather
    /// than an error.
    pub async fn connect(&self) -> bool {
        let mut guard = self.stream.lock().await;
        if guard.is_some() {
            return true;
        }
        match Self::open(&self.endpoint).await {
            Ok(framed) => {
                *guard = Some(framed);
                true
            }
            Err(err) => {
                debug!(endpoint = %self.endpoint, %err, "failed to connect");
                false
            }
        }
    }

    /// Drop the channel. Idempotent.
    pub async fn disconnect(&self) {
        let mut guard = self.stream.lock().await;
        if guard.take().is_some() {
            debug!(endpoint = %self.endpoint, "disconnected");
        }
    }

    /// Send one command and await its response, connecting lazily.
    ///
    /// The whole round trip holds the per-connection lock, and any I/O
    /// failure tears the channel down before surfacing — the next call
    /// triggers a fresh connect.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Connection`] when the channel is absent, broken,
    /// or closed mid-read, and [`AppError::Host`] when the host reports a
    /// domain error inside a well-formed response.
    pub async fn send_command(&self, command_type: &str, params: Value) -> Result<Value> {
        let mut guard = self.stream.lock().await;

        if guard.is_none() {
            *guard = Some(Self::open(&self.endpoint).await?);
        }
        let framed = guard
            .as_mut()
            .ok_or_else(|| AppError::Connection("not connected".into()))?;

        // The host expects empty params for ping regardless of input.
        let params = if command_type == "ping" {
            Value::Object(serde_json::Map::new())
        } else {
            params
        };
        let request = CommandRequest::new(command_type, params);

        match Self::exchange(framed, request).await {
            Ok(body) => match unwrap_envelope(body, command_type) {
                Ok(payload) => Ok(payload),
                // Domain errors leave the channel usable; codec damage does not.
                Err(err @ AppError::Host(_)) => Err(err),
                Err(err) => {
                    warn!(endpoint = %self.endpoint, %err, "response unusable, tearing down");
                    *guard = None;
                    Err(err)
                }
            },
            Err(err) => {
                warn!(endpoint = %self.endpoint, %err, "channel failure, tearing down");
                *guard = None;
                Err(err)
            }
        }
    }

    /// Write one framed request and read one framed response.
    async fn exchange(
        framed: &mut Framed<Stream, FrameCodec>,
        request: CommandRequest,
    ) -> Result<Value> {
        framed.send(request).await.map_err(as_connection_error)?;

        match framed.next().await {
            Some(Ok(body)) => Ok(body),
            Some(Err(err)) => Err(as_connection_error(err)),
            None => Err(AppError::Connection(
                "channel closed before response".into(),
            )),
        }
    }

    /// Connect to the endpoint and drain the handshake banner.
    async fn open(endpoint: &str) -> Result<Framed<Stream, FrameCodec>> {
        if !endpoint_exists(endpoint) {
            return Err(AppError::Connection(format!(
                "channel endpoint absent: {endpoint}"
            )));
        }

        let name = endpoint
            .to_fs_name::<GenericFilePath>()
            .map_err(|err| AppError::Connection(format!("invalid endpoint {endpoint}: {err}")))?;

        let mut stream = Stream::connect(name)
            .await
            .map_err(|err| AppError::Connection(format!("connect to {endpoint} failed: {err}")))?;

        // Drain the welcome banner so it cannot corrupt the first exchange.
        let mut banner = [0u8; BANNER_BYTES];
        let read = stream
            .read(&mut banner)
            .await
            .map_err(|err| AppError::Connection(format!("handshake read failed: {err}")))?;
        if read == 0 {
            return Err(AppError::Connection(
                "channel closed during handshake".into(),
            ));
        }

        info!(endpoint, "connected to Unity channel");
        Ok(Framed::new(stream, FrameCodec::new()))
    }
}

/// Collapse transport-level failures into [`AppError::Connection`].
fn as_connection_error(err: AppError) -> AppError {
    match err {
        AppError::Io(msg) => AppError::Connection(msg),
        other => other,
    }
}

/// Shared cache of one [`HostConnection`] per instance hash.
///
/// Connections are created on demand and reused; each one serializes its
/// own exchanges, so the pool itself needs no further locking discipline.
pub struct ConnectionPool {
    channel_dir: PathBuf,
    connections: Mutex<HashMap<String, Arc<HostConnection>>>,
}

impl ConnectionPool {
    /// Create an empty pool scanning `channel_dir` for endpoints.
    #[must_use]
    pub fn new(channel_dir: PathBuf) -> Self {
        Self {
            channel_dir,
            connections: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding channel endpoints on Unix platforms.
    #[must_use]
    pub fn channel_dir(&self) -> &Path {
        &self.channel_dir
    }

    /// The connection for an instance hash, created if absent.
    pub async fn connection_for(&self, project_hash: &str) -> Arc<HostConnection> {
        let mut guard = self.connections.lock().await;
        Arc::clone(
            guard
                .entry(project_hash.to_owned())
                .or_insert_with(|| Arc::new(HostConnection::new(&self.channel_dir, project_hash))),
        )
    }
}
