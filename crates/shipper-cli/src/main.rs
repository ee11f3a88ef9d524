//! shipper — roll new container images out to an ECS service.
//!
//! # Usage
//!
//! ```text
//! shipper --task api --service api-svc --cluster prod \
//!     --containers web=registry/web:v2 --containers sidecar=registry/proxy:1.4
//! ```
//!
//! Exit status: 0 when the service was deployed (with or without a
//! warning), 1 when the rollout failed, 2 on configuration errors.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use shipper_core::{EcsApi, MemoryEcs, ShipperConfig};
use shipper_ecs::EcsClient;
use shipper_rollout::{Cancellation, DeployOutcome, Deployer};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod settings;

use settings::{DeployArgs, Resolved};

#[derive(Parser)]
#[command(
    name = "shipper",
    about = "Shipper — deploy new container images to an ECS service",
    version
)]
struct Cli {
    #[command(flatten)]
    args: DeployArgs,
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let (resolved, api) = match prepare(&cli.args) {
        Ok(prepared) => prepared,
        Err(e) => {
            error!("invalid configuration: {e:#}");
            return ExitCode::from(2);
        }
    };

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling rollout");
            let _ = cancel_tx.send(true);
        }
    });
    let mut cancel = Cancellation::from_signal(cancel_rx);
    if let Some(timeout) = resolved.timeout {
        cancel = cancel.with_timeout(timeout);
    }

    let outcome = Deployer::new(api).run(&resolved.request, &cancel).await;
    let printed = match (outcome.report(), outcome.registered()) {
        (Some(report), _) => Some(serde_json::to_string_pretty(report)),
        (None, Some(registered)) => Some(serde_json::to_string_pretty(registered)),
        (None, None) => None,
    };
    match printed {
        Some(Ok(json)) => println!("{json}"),
        Some(Err(e)) => warn!(error = %e, "failed to encode report"),
        None => {}
    }

    match outcome {
        DeployOutcome::Done(_) | DeployOutcome::DoneWithWarning { .. } => ExitCode::SUCCESS,
        DeployOutcome::Failed { .. } => ExitCode::FAILURE,
    }
}

fn init_tracing() {
    let debug = std::env::var("DEBUG").is_ok_and(|v| !v.is_empty());
    let default = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(debug)
        .with_writer(std::io::stderr)
        .init();
}

/// Resolve settings and build the orchestrator client.
fn prepare(args: &DeployArgs) -> anyhow::Result<(Resolved, Arc<dyn EcsApi>)> {
    let (config, _) = ShipperConfig::load(args.config.as_deref())?;
    let resolved = args.resolve(config, |key| std::env::var(key).ok())?;

    let api: Arc<dyn EcsApi> = match &resolved.dry_run {
        Some(fixture) => {
            info!(fixture = %fixture.display(), "dry run against in-memory orchestrator");
            Arc::new(MemoryEcs::from_fixture_file(fixture)?)
        }
        None => {
            let client = EcsClient::from_config(&resolved.aws).context("error loading AWS config")?;
            info!(region = client.region(), endpoint = client.endpoint(), "using ECS endpoint");
            Arc::new(client)
        }
    };
    Ok((resolved, api))
}
