#![forbid(unsafe_code)]

//! `unity-mcp-bridge` — transport bridge and execution orchestrator binary.
//!
//! Bootstraps configuration and tracing, assembles the transport stack
//! (discovery, connection pool, plugin hub, route selector), and serves the
//! local HTTP surface until a shutdown signal arrives.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use unity_mcp_bridge::config::GlobalConfig;
use unity_mcp_bridge::http::{self, AppState};
use unity_mcp_bridge::orchestrator::executor::ToolExecutor;
use unity_mcp_bridge::registry::ToolRegistry;
use unity_mcp_bridge::transport::connection::ConnectionPool;
use unity_mcp_bridge::transport::discovery::{ChannelScanner, InstanceDiscovery};
use unity_mcp_bridge::transport::hub::PluginHub;
use unity_mcp_bridge::transport::selector::{CommandPort, LocalPort, TransportRouter};
use unity_mcp_bridge::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "unity-mcp-bridge", about = "Unity MCP transport bridge", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the directory scanned for Unity channel endpoints.
    #[arg(long)]
    channel_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("unity-mcp-bridge bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = match args.config {
        Some(path) => GlobalConfig::load_from_path(path)?,
        None => GlobalConfig::default(),
    };
    if let Some(dir) = args.channel_dir {
        config.channel_dir = dir;
    }
    let mode = config.transport_mode();
    info!(?mode, "configuration loaded");

    // ── Assemble the transport stack ────────────────────
    let pool = Arc::new(ConnectionPool::new(config.channel_dir.clone()));
    let discovery: Arc<dyn InstanceDiscovery> = Arc::new(ChannelScanner::new(Arc::clone(&pool)));
    let hub = Arc::new(PluginHub::new(config.effective_hub_url()));
    let local: Arc<dyn CommandPort> = Arc::new(LocalPort::new(pool, Arc::clone(&discovery)));
    let router: Arc<dyn CommandPort> = Arc::new(TransportRouter::new(
        mode,
        Arc::clone(&local),
        Arc::clone(&hub),
    ));

    let registry = Arc::new(ToolRegistry::new(discovery, local, Some(hub)));
    let executor = Arc::new(ToolExecutor::new(Arc::clone(&registry), router));

    let state = Arc::new(AppState { registry, executor });

    // ── Prime the registry from live instances ──────────
    state.registry.sync_all_instances(true).await;

    // ── Serve until shutdown ────────────────────────────
    let ct = CancellationToken::new();
    let serve_ct = ct.clone();
    let serve_state = Arc::clone(&state);
    let http_port = config.http_port;
    let http_handle = tokio::spawn(async move {
        if let Err(err) = http::serve(serve_state, http_port, serve_ct).await {
            error!(%err, "HTTP surface failed");
        }
    });

    info!("unity-mcp-bridge ready");

    shutdown_signal().await;
    info!("shutdown signal received");
    ct.cancel();

    let _ = http_handle.await;
    info!("unity-mcp-bridge shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
