//! Per-call routing between the local-channel path and the plugin hub.
//!
//! The [`CommandPort`] trait is the seam the registry and orchestrator
//! depend on; [`LocalPort`] drives framed local channels and
//! [`TransportRouter`] adds the process-wide stdio/http split on top. Both
//! paths return the unwrapped payload shape, so callers never branch on
//! transport.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::transport::connection::ConnectionPool;
use crate::transport::discovery::{match_instance, InstanceDiscovery};
use crate::transport::framing::unwrap_envelope;
use crate::transport::hub::PluginHub;
use crate::transport::TransportMode;
use crate::{AppError, Result};

/// Dispatch surface for sending one command to one instance.
pub trait CommandPort: Send + Sync {
    /// Send `command_type` with `params` to the instance named by `token`
    /// (or the sole reachable instance when `token` is `None`) and return
    /// the response payload.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Connection`] / [`AppError::Hub`] on transport
    /// failures, [`AppError::Host`] on host-reported domain errors, and
    /// [`AppError::Validation`] on malformed calls rejected before any
    /// network activity.
    fn send_to_instance<'a>(
        &'a self,
        token: Option<&'a str>,
        command_type: &'a str,
        params: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

    /// Send `command_type` to an instance whose channel hash is already
    /// known, skipping token resolution.
    ///
    /// The registry sync loop already holds discovered hashes; addressing
    /// by hash avoids re-sweeping the channel namespace for every send.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`CommandPort::send_to_instance`].
    fn send_to_hash<'a>(
        &'a self,
        hash: &'a str,
        command_type: &'a str,
        params: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        self.send_to_instance(Some(hash), command_type, params)
    }
}

/// Local-channel dispatch: resolve the token against discovery, then run a
/// framed exchange on the pooled connection.
pub struct LocalPort {
    pool: Arc<ConnectionPool>,
    discovery: Arc<dyn InstanceDiscovery>,
}

impl LocalPort {
    /// Create a local dispatcher over the given pool and discovery source.
    #[must_use]
    pub fn new(pool: Arc<ConnectionPool>, discovery: Arc<dyn InstanceDiscovery>) -> Self {
        Self { pool, discovery }
    }

    /// Resolve an instance token to a channel hash.
    async fn resolve_hash(&self, token: Option<&str>) -> Result<String> {
        let instances = self.discovery.discover_all().await?;

        match token {
            Some(token) => match_instance(&instances, token)
                .map(|inst| inst.hash.clone())
                .ok_or_else(|| AppError::Connection(format!("instance not found: {token}"))),
            None => match instances.as_slice() {
                [only] => Ok(only.hash.clone()),
                [] => Err(AppError::Connection(
                    "no Unity instances discovered".into(),
                )),
                _ => Err(AppError::Connection(
                    "multiple Unity instances reachable; specify an instance token".into(),
                )),
            },
        }
    }
}

impl CommandPort for LocalPort {
    fn send_to_instance<'a>(
        &'a self,
        token: Option<&'a str>,
        command_type: &'a str,
        params: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            let hash = self.resolve_hash(token).await?;
            self.send_to_hash(&hash, command_type, params).await
        })
    }

    fn send_to_hash<'a>(
        &'a self,
        hash: &'a str,
        command_type: &'a str,
        params: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            let connection = self.pool.connection_for(hash).await;
            debug!(instance_hash = %hash, command = command_type, "dispatching local command");
            connection.send_command(command_type, params).await
        })
    }
}

/// Mode-aware dispatcher sitting in front of the orchestrator.
///
/// The mode is fixed at construction from process-wide configuration, not
/// chosen per call.
pub struct TransportRouter {
    mode: TransportMode,
    local: Arc<dyn CommandPort>,
    hub: Arc<PluginHub>,
}

impl TransportRouter {
    /// Create a router for the given mode.
    #[must_use]
    pub fn new(mode: TransportMode, local: Arc<dyn CommandPort>, hub: Arc<PluginHub>) -> Self {
        Self { mode, local, hub }
    }

    /// The mode this router was fixed to at startup.
    #[must_use]
    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    /// Hub-path dispatch with pre-network validation.
    async fn send_via_hub(
        &self,
        token: Option<&str>,
        command_type: &str,
        params: Value,
    ) -> Result<Value> {
        if command_type.is_empty() {
            return Err(AppError::Validation(
                "HTTP transport requires a command type".into(),
            ));
        }
        if !params.is_object() {
            return Err(AppError::Validation(
                "command parameters must be an object for the HTTP transport".into(),
            ));
        }

        let raw = self
            .hub
            .send_command_for_instance(token, command_type, &params)
            .await?;
        unwrap_envelope(raw, command_type)
    }
}

impl CommandPort for TransportRouter {
    fn send_to_instance<'a>(
        &'a self,
        token: Option<&'a str>,
        command_type: &'a str,
        params: Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>> {
        Box::pin(async move {
            match self.mode {
                TransportMode::Http => self.send_via_hub(token, command_type, params).await,
                TransportMode::Stdio => {
                    self.local.send_to_instance(token, command_type, params).await
                }
            }
        })
    }
}
