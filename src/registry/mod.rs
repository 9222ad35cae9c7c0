//! Per-project tool registry, live-instance sync, and identity resolution.
//!
//! The registry owns two process-wide maps: project id → registered tools,
//! and lowercased instance hash → project id. Both are guarded by one
//! mutex because registrations arrive from concurrent tasks; the semantics
//! for same-name races are deliberately last-writer-wins — definitions are
//! replaced wholesale, never merged, and never deleted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info_span, warn, Instrument};

use crate::models::tool::ToolDefinition;
use crate::transport::discovery::{match_instance, InstanceDiscovery};
use crate::transport::hub::PluginHub;
use crate::transport::selector::CommandPort;

/// Minimum interval between non-forced instance syncs.
const SYNC_INTERVAL: Duration = Duration::from_secs(5);

/// Introspection command listing the tools an instance exposes.
const INTROSPECTION_COMMAND: &str = "list_csharp_tools";

/// Classification of one batch registration.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Names upserted by this batch (every incoming tool).
    pub registered: Vec<String>,
    /// Names that overwrote an existing registration.
    pub replaced: Vec<String>,
    /// Human-readable summary.
    pub message: String,
}

#[derive(Default)]
struct RegistryState {
    project_tools: HashMap<String, HashMap<String, ToolDefinition>>,
    hash_to_project: HashMap<String, String>,
    last_sync: Option<Instant>,
}

/// Process-wide tool registry.
pub struct ToolRegistry {
    discovery: Arc<dyn InstanceDiscovery>,
    local: Arc<dyn CommandPort>,
    hub: Option<Arc<PluginHub>>,
    state: Mutex<RegistryState>,
}

impl ToolRegistry {
    /// Create an empty registry.
    ///
    /// `local` must dispatch over the local-channel path: syncs always talk
    /// to discovered instances directly, regardless of the process
    /// transport mode.
    #[must_use]
    pub fn new(
        discovery: Arc<dyn InstanceDiscovery>,
        local: Arc<dyn CommandPort>,
        hub: Option<Arc<PluginHub>>,
    ) -> Self {
        Self {
            discovery,
            local,
            hub,
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Whether a tool is registered for a project.
    pub async fn is_registered(&self, project_id: &str, tool_name: &str) -> bool {
        let state = self.state.lock().await;
        state
            .project_tools
            .get(project_id)
            .is_some_and(|tools| tools.contains_key(tool_name))
    }

    /// Upsert one tool definition, overwriting any same-named entry.
    pub async fn register_tool(&self, project_id: &str, definition: ToolDefinition) {
        let mut state = self.state.lock().await;
        state
            .project_tools
            .entry(project_id.to_owned())
            .or_default()
            .insert(definition.name.clone(), definition);
    }

    /// Register a batch of tools, classifying each as new or replaced.
    ///
    /// Every incoming definition is upserted; a name that already existed
    /// is additionally reported as replaced. When `project_hash` is given
    /// its lowercased form is mapped to `project_id`, overwriting any prior
    /// mapping for that hash.
    pub async fn register_batch(
        &self,
        project_id: &str,
        project_hash: Option<&str>,
        tools: Vec<ToolDefinition>,
    ) -> BatchOutcome {
        let mut registered = Vec::with_capacity(tools.len());
        let mut replaced = Vec::new();

        let mut state = self.state.lock().await;
        let project = state.project_tools.entry(project_id.to_owned()).or_default();
        for definition in tools {
            if project.contains_key(&definition.name) {
                replaced.push(definition.name.clone());
            }
            registered.push(definition.name.clone());
            project.insert(definition.name.clone(), definition);
        }

        if let Some(hash) = project_hash {
            state
                .hash_to_project
                .insert(hash.to_lowercase(), project_id.to_owned());
        }

        let mut message = format!("Registered {} tool(s)", registered.len());
        if !replaced.is_empty() {
            message.push_str(&format!(" (replaced: {})", replaced.join(", ")));
        }

        BatchOutcome {
            registered,
            replaced,
            message,
        }
    }

    /// The project id previously recorded for an instance hash, if any.
    pub async fn project_id_for_hash(&self, project_hash: &str) -> Option<String> {
        let state = self.state.lock().await;
        state
            .hash_to_project
            .get(&project_hash.to_lowercase())
            .cloned()
    }

    /// Refresh registrations from every reachable instance.
    ///
    /// Throttled to once per five seconds unless `force` is set. Each
    /// instance is queried for its tool list; malformed descriptors are
    /// skipped with a warning and one failing instance never aborts the
    /// sweep for the others.
    pub async fn sync_all_instances(&self, force: bool) {
        {
            let mut state = self.state.lock().await;
            if !force {
                if let Some(last) = state.last_sync {
                    if last.elapsed() < SYNC_INTERVAL {
                        return;
                    }
                }
            }
            state.last_sync = Some(Instant::now());
        }

        let span = info_span!("instance_sync", force);
        async {
            let instances = match self.discovery.discover_all().await {
                Ok(instances) => instances,
                Err(err) => {
                    warn!(%err, "instance discovery failed during sync");
                    return;
                }
            };

            for instance in instances {
                // Hashes come straight from the sweep above; addressing by
                // hash avoids one namespace re-scan per instance.
                let reply = self
                    .local
                    .send_to_hash(
                        &instance.hash,
                        INTROSPECTION_COMMAND,
                        Value::Object(serde_json::Map::new()),
                    )
                    .await;

                match reply {
                    Ok(payload) => self.absorb_tool_list(&instance.project_id(), &payload).await,
                    Err(err) => {
                        debug!(instance_id = %instance.id, %err, "failed to sync tools from instance");
                    }
                }
            }
        }
        .instrument(span)
        .await;
    }

    /// Fold one introspection reply into the registry.
    async fn absorb_tool_list(&self, project_id: &str, payload: &Value) {
        let Some(descriptors) = payload.get("tools").and_then(Value::as_array) else {
            debug!(project_id, "introspection reply carried no tool list");
            return;
        };

        let mut state = self.state.lock().await;
        let project = state.project_tools.entry(project_id.to_owned()).or_default();
        for descriptor in descriptors {
            match ToolDefinition::from_descriptor(descriptor) {
                Ok(definition) => {
                    if ToolDefinition::auto_register(descriptor) {
                        project.insert(definition.name.clone(), definition);
                    }
                }
                Err(err) => {
                    warn!(project_id, %err, "skipping malformed tool descriptor");
                }
            }
        }
    }

    /// The cached definition for a tool, if any.
    async fn cached_definition(
        &self,
        project_id: &str,
        tool_name: &str,
    ) -> Option<ToolDefinition> {
        let state = self.state.lock().await;
        state
            .project_tools
            .get(project_id)
            .and_then(|tools| tools.get(tool_name))
            .cloned()
    }

    /// Look up a tool definition: cache, then a non-forced sync, then the
    /// plugin hub as a final fallback.
    pub async fn get_tool_definition(
        &self,
        project_id: &str,
        tool_name: &str,
    ) -> Option<ToolDefinition> {
        if let Some(definition) = self.cached_definition(project_id, tool_name).await {
            return Some(definition);
        }

        self.sync_all_instances(false).await;
        if let Some(definition) = self.cached_definition(project_id, tool_name).await {
            return Some(definition);
        }

        let hub = self.hub.as_ref()?;
        match hub.get_tool_definition(project_id, tool_name).await {
            Ok(definition) => definition,
            Err(err) => {
                debug!(project_id, tool_name, %err, "hub tool lookup failed");
                None
            }
        }
    }

    /// All tools known for a project: forced sync, then the union of local
    /// registrations and the hub's listing.
    pub async fn list_tools(&self, project_id: &str) -> Vec<ToolDefinition> {
        self.sync_all_instances(true).await;

        let mut tools: Vec<ToolDefinition> = {
            let state = self.state.lock().await;
            state
                .project_tools
                .get(project_id)
                .map(|project| project.values().cloned().collect())
                .unwrap_or_default()
        };
        tools.sort_by(|a, b| a.name.cmp(&b.name));

        if let Some(hub) = &self.hub {
            match hub.get_tools_for_project(project_id).await {
                Ok(hub_tools) => tools.extend(hub_tools),
                Err(err) => {
                    debug!(project_id, %err, "hub tool listing failed");
                }
            }
        }

        tools
    }

    /// Resolve an instance token to a project identifier.
    ///
    /// Tries discovered instances first (failures are swallowed), then the
    /// recorded hash table, and finally falls back to the lowercased hash
    /// itself — an unresolved but syntactically valid identifier is
    /// tolerated rather than failing outright. Only a missing token yields
    /// `None`.
    pub async fn resolve_project_id(&self, token: Option<&str>) -> Option<String> {
        let token = token?;

        match self.discovery.discover_all().await {
            Ok(instances) => {
                if let Some(instance) = match_instance(&instances, token) {
                    return Some(instance.project_id());
                }
            }
            Err(err) => {
                debug!(token, %err, "discovery failed during project id resolution");
            }
        }

        let hash_part = token
            .split_once('@')
            .map_or(token, |(_, suffix)| suffix);
        if hash_part.is_empty() {
            return None;
        }

        let lowered = hash_part.to_lowercase();
        if let Some(mapped) = self.project_id_for_hash(&lowered).await {
            return Some(mapped);
        }
        Some(lowered)
    }
}
