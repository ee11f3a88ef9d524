//! shipperd — the Shipper daemon.
//!
//! Serves deploy events over HTTP. Rollouts touching the same task
//! definition family or service are serialized in-process.
//!
//! # Usage
//!
//! ```text
//! shipperd --port 8080 --config /etc/shipper/config.toml --log-json
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use shipper_core::{EcsApi, MemoryEcs, ShipperConfig};
use shipper_ecs::EcsClient;
use shipper_rollout::{Deployer, KeyedLock};
use shipper_trigger::{TriggerState, build_router};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "shipperd", about = "Shipper daemon — deploy events over HTTP", version)]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Config file (default: config/config.toml, optional).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Per-event deadline in seconds.
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Serve an in-memory orchestrator seeded from a JSON fixture.
    #[arg(long, value_name = "FIXTURE")]
    dry_run: Option<PathBuf>,

    /// Log as JSON lines.
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let (mut config, _) = ShipperConfig::load(cli.config.as_deref())?;
    config.apply_env(|key| std::env::var(key).ok());

    let api: Arc<dyn EcsApi> = match &cli.dry_run {
        Some(fixture) => {
            info!(fixture = %fixture.display(), "serving in-memory orchestrator");
            Arc::new(MemoryEcs::from_fixture_file(fixture)?)
        }
        None => {
            let client = EcsClient::from_config(&config.aws).context("error loading AWS config")?;
            info!(region = client.region(), endpoint = client.endpoint(), "using ECS endpoint");
            Arc::new(client)
        }
    };
    let deployer = Deployer::new(api).with_lock(Arc::new(KeyedLock::new()));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = TriggerState {
        deployer: Arc::new(deployer),
        timeout: cli.timeout.or(config.deploy.timeout_secs).map(Duration::from_secs),
        shutdown: Some(shutdown_rx),
    };

    // ── Start server ───────────────────────────────────────────

    let router = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "shipperd listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received, cancelling in-flight rollouts");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("shipperd stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let default = if std::env::var("DEBUG").is_ok_and(|v| !v.is_empty()) {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
