//! # syncer - Main Entry Point
//!
//! ## Startup Sequence (`run`)
//!
//! 1. **Configuration** - Load the TOML file and the YAML manifest
//! 2. **State** - Restore statuses persisted by the previous run
//! 3. **Handlers** - Bind the logs-metrics handler to the HTTP client
//! 4. **Reconciliation Loop** - Tick until Ctrl+C, snapshotting state
//!
//! ## Error Handling
//!
//! Startup failures halt with context; failures of individual resources are
//! recorded in their statuses and never stop the loop.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

mod cli;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use syncer::{HttpLogsMetricsClient, StateFile, load_manifest, seed_store};
use syncer_core::{Config, ResultExt};
use syncer_reconciler::handlers::LogsMetricsHandler;
use syncer_reconciler::{
    Clock, HandlerRegistry, InMemoryResourceStore, LoopConfig, ReconcileAction, ReconcilerBuilder,
    ReconciliationLoop, ResourceStore, SystemClock, TracingHandler, force_sync_due, plan, spec_hash,
};

use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = load_config(&config)?;
            init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level));
            run(config).await
        }
        Commands::Plan { config, force_sync } => {
            let config = load_config(&config)?;
            init_tracing(cli.log_level.as_deref().unwrap_or("warn"));
            print_plan(&config, force_sync).await
        }
        Commands::Hash { manifest } => {
            init_tracing(cli.log_level.as_deref().unwrap_or("warn"));
            print_hashes(&manifest)
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Load the manifest and the previous state into a fresh store.
async fn build_store(config: &Config) -> Result<(Arc<InMemoryResourceStore>, Option<StateFile>)> {
    let manifest = load_manifest(&config.manifest)
        .with_context(|| format!("Failed to load manifest {}", config.manifest.display()))?;

    let state = config.state_file.clone().map(StateFile::new);
    let previous = match &state {
        Some(state) => state
            .load()
            .with_context(|| format!("Failed to load state from {}", state.path().display()))?,
        None => Vec::new(),
    };

    let store = InMemoryResourceStore::new_arc();
    let summary = seed_store(store.as_ref(), manifest, previous)
        .await
        .context("Failed to seed resource store")?;
    info!(
        declared = summary.declared,
        restored = summary.restored,
        orphaned = summary.orphaned,
        "Resource store ready"
    );
    Ok((store, state))
}

async fn run(config: Config) -> Result<()> {
    info!("syncer starting...");

    let (store, state) = build_store(&config).await?;

    let settings = &config.reconcile;
    let client = HttpLogsMetricsClient::new(&config.api, settings.operation_timeout())
        .context("Failed to build API client")?;
    let handler = TracingHandler::new(LogsMetricsHandler::new(Arc::new(client)));
    let registry = HandlerRegistry::new().with(Arc::new(handler));
    info!(kinds = ?registry.kinds(), "Handlers registered");

    let reconciler = ReconcilerBuilder::new()
        .operation_timeout(settings.operation_timeout())
        .build()
        .context("Failed to build reconciler")?;

    let loop_config = LoopConfig {
        interval: settings.interval(),
        force_sync_period: Some(settings.force_sync_period()).filter(|p| !p.is_zero()),
        max_concurrent: settings.max_concurrent,
        max_errors: settings.max_errors,
        stop_on_error: false,
    };
    let mut reconciliation_loop = ReconciliationLoop::new(
        Arc::new(reconciler),
        Arc::new(registry),
        store.clone(),
        loop_config,
    )
    .context("Failed to build reconciliation loop")?;
    let stopper = reconciliation_loop.stopper();

    let mut handle = tokio::spawn(async move { reconciliation_loop.run().await });
    let mut snapshots = tokio::time::interval(settings.interval());
    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    info!("syncer is running. Press Ctrl+C to stop.");
    let joined = loop {
        tokio::select! {
            joined = &mut handle => break joined,
            () = &mut shutdown => {
                stopper.stop();
                break (&mut handle).await;
            }
            _ = snapshots.tick() => save_state(state.as_ref(), store.as_ref()).await,
        }
    };

    save_state(state.as_ref(), store.as_ref()).await;

    joined
        .context("Reconciliation loop task failed")?
        .context("Reconciliation loop stopped")?;

    info!("syncer stopped gracefully");
    Ok(())
}

async fn save_state(state: Option<&StateFile>, store: &dyn ResourceStore) {
    if let Some(state) = state {
        state.snapshot(store).await.into_option_logged("save state");
    }
}

async fn print_plan(config: &Config, force_sync: bool) -> Result<()> {
    let (store, _) = build_store(config).await?;
    let now = SystemClock.now();
    let period = Some(config.reconcile.force_sync_period()).filter(|p| !p.is_zero());

    for resource in store.list().await.context("Failed to list resources")? {
        let action = if resource.deletion_requested {
            ReconcileAction::Delete
        } else {
            let due = force_sync || force_sync_due(&resource.status, now, period);
            plan(&spec_hash(&resource.spec), &resource.status, due)
        };
        println!(
            "{}\t{}\t{}\t{}",
            resource.spec.key,
            resource.spec.kind,
            resource.status.state(),
            action
        );
    }
    Ok(())
}

fn print_hashes(manifest: &Path) -> Result<()> {
    let specs = load_manifest(manifest)
        .with_context(|| format!("Failed to load manifest {}", manifest.display()))?;
    for spec in specs {
        println!("{}\t{}\t{}", spec.key, spec.kind, spec_hash(&spec));
    }
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C).
async fn wait_for_shutdown() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
        Err(err) => error!("Failed to listen for shutdown signal: {}", err),
    }
}
