//! Integration tests for the tool registry: batch registration, instance
//! sync with throttling, descriptor absorption, and project-id resolution.

use std::sync::Arc;

use serde_json::json;

use unity_mcp_bridge::models::instance::Instance;
use unity_mcp_bridge::registry::ToolRegistry;
use unity_mcp_bridge::transport::connection::ConnectionPool;
use unity_mcp_bridge::transport::selector::{CommandPort, LocalPort};
use unity_mcp_bridge::AppError;

use super::test_helpers::{
    tool, CountingDiscovery, FailingDiscovery, ScriptedPort, StaticDiscovery,
};

fn instance(name: &str, path: &str, hash: &str) -> Instance {
    Instance::new(name.to_owned(), path.to_owned(), hash.to_owned())
}

// ── Batch registration ───────────────────────────────────────────────────────

/// Every tool in a batch is registered; none are replaced the first time.
#[tokio::test]
async fn first_batch_registers_without_replacements() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local, None);

    let outcome = registry
        .register_batch("P1", None, vec![tool("move_object"), tool("rotate_object")])
        .await;

    assert_eq!(outcome.registered, vec!["move_object", "rotate_object"]);
    assert!(outcome.replaced.is_empty());
    assert_eq!(outcome.message, "Registered 2 tool(s)");
    assert!(registry.is_registered("P1", "move_object").await);
    assert!(registry.is_registered("P1", "rotate_object").await);
}

/// Re-registering an existing name reports it as replaced and overwrites
/// the stored definition wholesale.
#[tokio::test]
async fn re_registration_reports_replacements() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local, None);

    registry
        .register_batch("P1", None, vec![tool("move_object")])
        .await;

    let mut updated = tool("move_object");
    updated.description = Some("v2".into());
    let outcome = registry
        .register_batch("P1", None, vec![updated, tool("scale_object")])
        .await;

    assert_eq!(outcome.registered, vec!["move_object", "scale_object"]);
    assert_eq!(outcome.replaced, vec!["move_object"]);
    assert_eq!(
        outcome.message,
        "Registered 2 tool(s) (replaced: move_object)"
    );

    let stored = registry
        .get_tool_definition("P1", "move_object")
        .await
        .expect("replaced tool must still resolve");
    assert_eq!(stored.description.as_deref(), Some("v2"));
}

/// Registrations are scoped per project; a same-named tool in another
/// project is untouched.
#[tokio::test]
async fn registrations_are_scoped_per_project() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local, None);

    registry.register_batch("P1", None, vec![tool("shared")]).await;

    assert!(registry.is_registered("P1", "shared").await);
    assert!(!registry.is_registered("P2", "shared").await);
}

/// A batch hash is recorded lowercased for later token resolution.
#[tokio::test]
async fn batch_hash_is_recorded_lowercased() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local, None);

    registry
        .register_batch("P1", Some("ABCDEF12"), vec![tool("move_object")])
        .await;

    assert_eq!(
        registry.project_id_for_hash("abcdef12").await.as_deref(),
        Some("P1")
    );
    assert_eq!(
        registry.project_id_for_hash("ABCDEF12").await.as_deref(),
        Some("P1"),
        "lookups must be case-insensitive too"
    );
}

// ── Instance sync ────────────────────────────────────────────────────────────

/// A sync queries each discovered instance for its tools and absorbs the
/// descriptors that opt in.
#[tokio::test]
async fn sync_absorbs_descriptors_respecting_the_opt_out() {
    let inst = instance("MyGame", "/p/mygame", "a1b2c3d4");
    let project_id = inst.project_id();
    let local = ScriptedPort::new(vec![Ok(json!({
        "tools": [
            {"name": "move_object"},
            {"name": "hidden_tool", "auto_register": false},
            {"no_name": true},
        ],
    }))]);
    let registry = ToolRegistry::new(
        StaticDiscovery::new(vec![inst]),
        local.clone(),
        None,
    );

    registry.sync_all_instances(true).await;

    assert!(registry.is_registered(&project_id, "move_object").await);
    assert!(
        !registry.is_registered(&project_id, "hidden_tool").await,
        "an explicit opt-out must suppress registration"
    );

    let calls = local.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].command_type, "list_csharp_tools");
    assert_eq!(calls[0].token.as_deref(), Some("a1b2c3d4"));
}

/// Back-to-back non-forced syncs are throttled; a forced sync always runs.
#[tokio::test]
async fn non_forced_syncs_are_throttled() {
    let inst = instance("MyGame", "/p/mygame", "a1b2c3d4");
    let local = ScriptedPort::new(vec![
        Ok(json!({"tools": []})),
        Ok(json!({"tools": []})),
    ]);
    let registry = ToolRegistry::new(
        StaticDiscovery::new(vec![inst]),
        local.clone(),
        None,
    );

    registry.sync_all_instances(true).await;
    registry.sync_all_instances(false).await;
    assert_eq!(
        local.calls().await.len(),
        1,
        "the second sync must be throttled away"
    );

    registry.sync_all_instances(true).await;
    assert_eq!(local.calls().await.len(), 2, "a forced sync must run");
}

/// One unreachable instance never aborts the sweep for the others.
#[tokio::test]
async fn sync_survives_a_failing_instance() {
    let broken = instance("Broken", "/p/broken", "00000000");
    let healthy = instance("Healthy", "/p/healthy", "11111111");
    let healthy_project = healthy.project_id();

    let local = ScriptedPort::new(vec![
        Err(AppError::Connection("endpoint gone".into())),
        Ok(json!({"tools": [{"name": "still_here"}]})),
    ]);
    let registry = ToolRegistry::new(
        StaticDiscovery::new(vec![broken, healthy]),
        local.clone(),
        None,
    );

    registry.sync_all_instances(true).await;

    assert!(registry.is_registered(&healthy_project, "still_here").await);
}

/// A failing namespace scan leaves existing registrations intact.
#[tokio::test]
async fn failed_discovery_preserves_registrations() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(FailingDiscovery::new(), local, None);

    registry.register_batch("P1", None, vec![tool("survivor")]).await;
    registry.sync_all_instances(true).await;

    assert!(registry.is_registered("P1", "survivor").await);
}

/// A sync runs exactly one discovery sweep no matter how many instances
/// it then introspects.
#[tokio::test]
async fn sync_runs_one_discovery_sweep() {
    let discovery = CountingDiscovery::new(vec![
        instance("One", "/p/one", "11111111"),
        instance("Two", "/p/two", "22222222"),
        instance("Three", "/p/three", "33333333"),
    ]);
    let local = ScriptedPort::new(vec![
        Ok(json!({"tools": []})),
        Ok(json!({"tools": []})),
        Ok(json!({"tools": []})),
    ]);
    let registry = ToolRegistry::new(discovery.clone(), local.clone(), None);

    registry.sync_all_instances(true).await;

    assert_eq!(local.calls().await.len(), 3, "every instance must be queried");
    assert_eq!(
        discovery.sweeps(),
        1,
        "introspection sends must not re-run discovery"
    );
}

/// Hash-addressed dispatch goes straight to the channel pool and never
/// consults discovery.
#[tokio::test]
async fn hash_dispatch_skips_token_resolution() {
    let dir = tempfile::tempdir().expect("tempdir");
    let discovery = CountingDiscovery::new(Vec::new());
    let pool = Arc::new(ConnectionPool::new(dir.path().to_path_buf()));
    let port = LocalPort::new(pool, discovery.clone());

    let result = port
        .send_to_hash("deadbeef", "list_csharp_tools", json!({}))
        .await;

    assert!(
        matches!(result, Err(AppError::Connection(_))),
        "the absent endpoint must fail at the channel, got: {result:?}"
    );
    assert_eq!(
        discovery.sweeps(),
        0,
        "hash dispatch must not sweep the namespace"
    );
}

/// A cached definition resolves without any dispatch to instances or hub.
#[tokio::test]
async fn cached_definition_resolves_without_dispatch() {
    let local = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local.clone(), None);
    registry.register_tool("P1", tool("move_object")).await;

    let definition = registry
        .get_tool_definition("P1", "move_object")
        .await
        .expect("registered tool must resolve from the cache");

    assert_eq!(definition.name, "move_object");
    assert!(
        local.calls().await.is_empty(),
        "a cache hit must not dispatch anything"
    );
}

// ── Listing ──────────────────────────────────────────────────────────────────

/// Listing returns local registrations sorted by name.
#[tokio::test]
async fn list_tools_is_sorted_by_name() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local, None);

    registry
        .register_batch("P1", None, vec![tool("zeta"), tool("alpha"), tool("mid")])
        .await;

    let names: Vec<String> = registry
        .list_tools("P1")
        .await
        .into_iter()
        .map(|definition| definition.name)
        .collect();
    assert_eq!(names, vec!["alpha", "mid", "zeta"]);
}

// ── Project-id resolution ────────────────────────────────────────────────────

/// A missing token resolves to nothing.
#[tokio::test]
async fn missing_token_resolves_to_none() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local, None);
    assert_eq!(registry.resolve_project_id(None).await, None);
}

/// A token naming a discovered instance resolves to that instance's
/// project id.
#[tokio::test]
async fn token_matching_discovery_resolves_to_project_id() {
    let inst = instance("MyGame", "/p/mygame", "a1b2c3d4");
    let expected = inst.project_id();
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::new(vec![inst]), local, None);

    assert_eq!(
        registry.resolve_project_id(Some("MyGame@a1b2")).await,
        Some(expected)
    );
}

/// With no matching instance the recorded hash table answers.
#[tokio::test]
async fn token_falls_back_to_the_recorded_hash_table() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local, None);
    registry
        .register_batch("P1", Some("FEEDBEEF"), vec![tool("move_object")])
        .await;

    assert_eq!(
        registry.resolve_project_id(Some("feedbeef")).await.as_deref(),
        Some("P1")
    );
    assert_eq!(
        registry
            .resolve_project_id(Some("MyGame@FEEDBEEF"))
            .await
            .as_deref(),
        Some("P1"),
        "the hash part of a composite token must be used for the lookup"
    );
}

/// An unresolved but non-empty hash is tolerated as an identifier.
#[tokio::test]
async fn unresolved_hash_is_returned_lowercased() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local, None);

    assert_eq!(
        registry.resolve_project_id(Some("DEADBEEF")).await.as_deref(),
        Some("deadbeef")
    );
}

/// A composite token with an empty hash part resolves to nothing.
#[tokio::test]
async fn empty_hash_part_resolves_to_none() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(StaticDiscovery::empty(), local, None);

    assert_eq!(registry.resolve_project_id(Some("MyGame@")).await, None);
}

/// Discovery failures during resolution are swallowed; later fallbacks
/// still apply.
#[tokio::test]
async fn discovery_failure_does_not_block_resolution() {
    let local: Arc<dyn CommandPort> = ScriptedPort::new(Vec::new());
    let registry = ToolRegistry::new(FailingDiscovery::new(), local, None);

    assert_eq!(
        registry.resolve_project_id(Some("cafe0123")).await.as_deref(),
        Some("cafe0123")
    );
}
