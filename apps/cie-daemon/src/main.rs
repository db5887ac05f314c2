//! # cie-daemon
//!
//! Process entry point for the Change Intelligence Engine.
//!
//! Owns no request-handling surface of its own (the HTTP/REST API is out
//! of scope, spec §1): it wires the graph store, change store, and audit
//! journal together, then runs the three periodic background jobs spec
//! §5 calls for as `tokio::spawn`ed loops — connector sync, approval
//! expiration, and metrics rollup — until interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::time::{interval, Duration};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cie_audit::AuditJournal;
use cie_core::EngineConfig;
use cie_graph::GraphStore;
use cie_metrics::MetricsEngine;
use cie_store::ChangeStore;
use cie_sync::{Connector, SyncCoordinator};
use cie_workflow::reap_all_expired_approvals;

/// Change Intelligence Engine daemon.
#[derive(Parser)]
#[command(name = "cie-daemon", about = "Change Intelligence Engine daemon")]
struct Cli {
    /// Directory holding change records, the audit journal, and engine.toml.
    #[arg(long, default_value = "./cie-data")]
    data_dir: PathBuf,

    /// How often to trigger a sync across all configured connectors.
    #[arg(long, default_value_t = 60)]
    sync_interval_secs: u64,

    /// How often to sweep changes for expired approvals.
    #[arg(long, default_value_t = 300)]
    reaper_interval_secs: u64,

    /// How often to recompute and log the KPI rollup.
    #[arg(long, default_value_t = 300)]
    metrics_interval_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("cie_daemon=info".parse()?)
                .add_directive("cie_sync=info".parse()?)
                .add_directive("cie_workflow=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    std::fs::create_dir_all(&cli.data_dir)
        .with_context(|| format!("creating data dir {}", cli.data_dir.display()))?;

    let config_path = cli.data_dir.join("engine.toml");
    let config = if config_path.exists() {
        EngineConfig::from_file(&config_path)
            .with_context(|| format!("loading {}", config_path.display()))?
    } else {
        info!(path = %config_path.display(), "no engine.toml found, using spec defaults");
        EngineConfig::default()
    };

    let graph = Arc::new(GraphStore::new(config.graph.core_device_k));
    let store = Arc::new(
        ChangeStore::new(cli.data_dir.join("changes"))
            .context("opening change store")?,
    );
    let audit = Arc::new(
        AuditJournal::open(cli.data_dir.join("audit.jsonl")).context("opening audit journal")?,
    );

    // Real device adapters are registered here by whatever deployment
    // wires this daemon up (spec §1 "out of scope"); none are compiled
    // into this core, so the connector set starts empty and the sync
    // loop below is a no-op until connectors are configured.
    let connectors: Vec<Arc<dyn Connector>> = Vec::new();
    if connectors.is_empty() {
        warn!("no connectors configured; graph will not receive topology updates");
    }
    let sync = Arc::new(SyncCoordinator::new(
        graph.clone(),
        audit.clone(),
        connectors,
        config.sync,
    ));

    info!(data_dir = %cli.data_dir.display(), "change intelligence engine starting");

    let sync_task = tokio::spawn(sync_loop(sync, Duration::from_secs(cli.sync_interval_secs)));
    let reaper_task = tokio::spawn(reaper_loop(
        store.clone(),
        audit.clone(),
        Duration::from_secs(cli.reaper_interval_secs),
    ));
    let metrics_task = tokio::spawn(metrics_loop(
        store,
        audit,
        graph,
        Duration::from_secs(cli.metrics_interval_secs),
    ));

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown signal received, stopping background jobs");
    sync_task.abort();
    reaper_task.abort();
    metrics_task.abort();

    Ok(())
}

/// Periodically trigger a sync across every configured connector,
/// applying their mutations to the graph store (spec §4.S).
async fn sync_loop(sync: Arc<SyncCoordinator>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        for (connector_id, result) in sync.sync_all().await {
            if let Err(err) = result {
                warn!(connector_id, error = %err, "connector sync failed");
            }
        }
    }
}

/// Periodically sweep every Pending/Analyzing change for approvals past
/// their `expires_at`, marking them Expired and auditing the sweep
/// (spec §4.W "Expiration").
async fn reaper_loop(store: Arc<ChangeStore>, audit: Arc<AuditJournal>, period: Duration) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        match reap_all_expired_approvals(&store, &audit, Utc::now()) {
            Ok(0) => {}
            Ok(n) => info!(expired = n, "approval expiration sweep"),
            Err(err) => warn!(error = %err, "approval expiration sweep failed"),
        }
    }
}

/// Periodically recompute the §4.M KPI rollup over the full change
/// history and log it. The rollup itself is cheap enough (one pass over
/// the store + journal) that nothing is cached between ticks.
async fn metrics_loop(
    store: Arc<ChangeStore>,
    audit: Arc<AuditJournal>,
    graph: Arc<GraphStore>,
    period: Duration,
) {
    let mut ticker = interval(period);
    loop {
        ticker.tick().await;
        let snapshot = graph.snapshot();
        match MetricsEngine::rollup(&store, &audit, &snapshot, Utc::now(), None) {
            Ok(rollup) => info!(?rollup, "metrics rollup"),
            Err(err) => warn!(error = %err, "metrics rollup failed"),
        }
    }
}
