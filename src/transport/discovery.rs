//! Enumeration of reachable Unity editor instances.
//!
//! The production [`ChannelScanner`] sweeps the local-channel namespace for
//! `UnityMCP` endpoints, then asks each live channel for its project
//! identity. Instances are ephemeral — every sweep rebuilds the list from
//! scratch and per-channel failures are logged and skipped, never fatal.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::models::instance::Instance;
use crate::transport::connection::ConnectionPool;
use crate::Result;

/// Introspection command answering `{name, path}` for a live instance.
const IDENTITY_COMMAND: &str = "get_project_info";

/// Source of reachable editor instances for the local-channel transport.
///
/// Implementations return the complete current set on every call; the
/// registry and resolver never cache instances across calls.
pub trait InstanceDiscovery: Send + Sync {
    /// Enumerate all currently reachable instances.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`](crate::AppError::Io) when the channel
    /// namespace itself cannot be read. Individual unreachable channels are
    /// skipped, not surfaced.
    fn discover_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Instance>>> + Send + '_>>;
}

/// Find a discovered instance matching an instance token.
///
/// A composite token `<name>@<hash prefix>` requires an exact name match
/// plus hash-prefix match; a bare token matches the instance id exactly or
/// the hash as a prefix.
#[must_use]
pub fn match_instance<'a>(instances: &'a [Instance], token: &str) -> Option<&'a Instance> {
    if let Some((name, hash_hint)) = token.split_once('@') {
        instances
            .iter()
            .find(|inst| inst.name == name && inst.hash.starts_with(hash_hint))
    } else {
        instances
            .iter()
            .find(|inst| inst.id == token || inst.hash.starts_with(token))
    }
}

/// Discovery backed by a filesystem/namespace scan plus an identity probe
/// over the framed protocol.
pub struct ChannelScanner {
    pool: Arc<ConnectionPool>,
}

impl ChannelScanner {
    /// Create a scanner probing through the given connection pool.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Enumerate candidate project hashes from the channel namespace.
    #[cfg(unix)]
    fn scan_hashes(&self) -> Result<Vec<String>> {
        let pattern = self
            .pool
            .channel_dir()
            .join("UnityMCP.*.sock")
            .to_string_lossy()
            .into_owned();
        let paths = glob::glob(&pattern)
            .map_err(|err| crate::AppError::Io(format!("bad channel glob: {err}")))?;

        let mut hashes = Vec::new();
        for entry in paths {
            let Ok(path) = entry else { continue };
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if let Some(hash) = file_name
                .strip_prefix("UnityMCP.")
                .and_then(|rest| rest.strip_suffix(".sock"))
            {
                if !hash.is_empty() {
                    hashes.push(hash.to_owned());
                }
            }
        }
        Ok(hashes)
    }

    /// Enumerate candidate project hashes from the pipe namespace.
    #[cfg(windows)]
    fn scan_hashes(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(r"\\.\pipe\")
            .map_err(|err| crate::AppError::Io(format!("cannot list pipe namespace: {err}")))?;

        let mut hashes = Vec::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(hash) = name.strip_prefix("UnityMCP.") {
                if !hash.is_empty() {
                    hashes.push(hash.to_owned());
                }
            }
        }
        Ok(hashes)
    }

    /// Ask one live channel for its project identity.
    async fn probe(&self, hash: &str) -> Result<Instance> {
        let connection = self.pool.connection_for(hash).await;
        let info = connection
            .send_command(IDENTITY_COMMAND, Value::Object(serde_json::Map::new()))
            .await?;

        let name = info.get("name").and_then(Value::as_str);
        let path = info.get("path").and_then(Value::as_str);
        match (name, path) {
            (Some(name), Some(path)) => {
                Ok(Instance::new(name.to_owned(), path.to_owned(), hash.to_owned()))
            }
            _ => Err(crate::AppError::Host(format!(
                "instance {hash} returned incomplete project info"
            ))),
        }
    }
}

impl InstanceDiscovery for ChannelScanner {
    fn discover_all(&self) -> Pin<Box<dyn Future<Output = Result<Vec<Instance>>> + Send + '_>> {
        Box::pin(async move {
            let hashes = self.scan_hashes()?;
            let mut instances = Vec::with_capacity(hashes.len());

            for hash in hashes {
                match self.probe(&hash).await {
                    Ok(instance) => {
                        debug!(instance_id = %instance.id, "discovered instance");
                        instances.push(instance);
                    }
                    Err(err) => {
                        warn!(instance_hash = %hash, %err, "skipping unreachable instance");
                    }
                }
            }

            Ok(instances)
        })
    }
}
