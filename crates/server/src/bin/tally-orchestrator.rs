//! tally-orchestrator: accepts expressions, schedules their operations and
//! hands them to agents over the dispatch endpoint.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

use tally_agent::{shutdown_signal, WorkerPool};
use tally_core::config::{load_dotenv, Config};
use tally_core::OwnerId;
use tally_dispatch::{DispatchServer, LocalDispatcher, Transport};
use tally_server::background::{
    spawn_lease_reaper, spawn_queue_monitor, spawn_result_reporter, QUEUE_LOG_INTERVAL,
};
use tally_server::build_orchestrator;

/// Tally orchestrator: distributed arithmetic expression scheduler.
#[derive(Parser, Debug)]
#[command(name = "tally-orchestrator", version, about)]
struct Cli {
    /// Dispatch bind host (overrides DISPATCH_HOST).
    #[arg(long)]
    host: Option<String>,

    /// Dispatch bind port (overrides DISPATCH_PORT).
    #[arg(long)]
    port: Option<u16>,

    /// Expression store root (overrides DATA_DIR).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Task lease in seconds, 0 disables (overrides TASK_LEASE_SECS).
    #[arg(long)]
    lease_secs: Option<u64>,

    /// Accepted owners as `owner:token,owner:token`. Without it every owner is accepted.
    #[arg(long, env = "TALLY_TOKENS")]
    tokens: Option<String>,

    /// Run this many worker loops inside the orchestrator process.
    #[arg(long, default_value_t = 0)]
    local_workers: usize,

    /// Submit an expression at startup and log its final status. Repeatable.
    #[arg(long = "expr")]
    exprs: Vec<String>,

    /// Owner used for `--expr` submissions.
    #[arg(long, default_value = "cli")]
    owner: String,

    /// Token used for `--expr` submissions.
    #[arg(long, env = "TALLY_TOKEN", default_value = "")]
    token: String,

    /// Shutdown timeout in seconds.
    #[arg(long, default_value_t = 10)]
    shutdown_timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(host) = cli.host {
        config.dispatch.host = host;
    }
    if let Some(port) = cli.port {
        config.dispatch.port = port;
    }
    if let Some(dir) = cli.data_dir {
        config.storage.data_dir = dir;
    }
    if let Some(secs) = cli.lease_secs {
        config.lease.lease_secs = secs;
    }
    config.log_summary();
    debug!(config = %config.summary(), "effective configuration");

    let (orchestrator, report) = build_orchestrator(&config, cli.tokens.as_deref())?;
    info!(?report, "stored expressions recovered");

    let local = Arc::new(LocalDispatcher::new(orchestrator.clone()));
    let transport = Transport::from_config(&config.dispatch);
    let server = DispatchServer::bind(&transport, local.clone()).await?;
    info!(endpoint = %transport, "dispatch endpoint bound");

    let server_stop = Arc::new(Notify::new());
    let server_handle = {
        let stop = server_stop.clone();
        tokio::spawn(async move { server.serve(stop).await })
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut background = vec![spawn_queue_monitor(
        orchestrator.clone(),
        QUEUE_LOG_INTERVAL,
        stop_rx.clone(),
    )];
    if config.lease.lease_timeout().is_some() {
        background.push(spawn_lease_reaper(
            orchestrator.clone(),
            config.lease.reap_interval(),
            stop_rx.clone(),
        ));
    } else {
        info!("task leases disabled");
    }

    let pool = if cli.local_workers > 0 {
        let mut agent = config.agent.clone();
        agent.computing_power = cli.local_workers;
        let pool = WorkerPool::new("local-agent", local.clone(), agent);
        pool.spawn().await?;
        Some(pool)
    } else {
        None
    };

    let owner = OwnerId::new(cli.owner);
    let mut submitted = Vec::new();
    for text in &cli.exprs {
        match orchestrator.submit(text, &owner, &cli.token) {
            Ok(id) => {
                info!(expression_id = %id, source = %text, "expression accepted");
                submitted.push(id);
            }
            Err(e) => warn!(source = %text, kind = e.kind(), error = %e, "expression rejected"),
        }
    }
    if !submitted.is_empty() {
        background.push(spawn_result_reporter(
            orchestrator.clone(),
            submitted,
            Duration::from_millis(200),
            stop_rx.clone(),
        ));
    }

    info!("tally-orchestrator running, press Ctrl+C to stop");
    shutdown_signal().await;
    info!("shutdown signal received");

    let deadline = Duration::from_secs(cli.shutdown_timeout);
    let drain = async {
        if let Some(pool) = &pool {
            if let Err(e) = pool.shutdown().await {
                warn!(error = %e, "local worker pool did not stop cleanly");
            }
        }
        stop_tx.send_replace(true);
        server_stop.notify_one();
        for handle in background {
            let _ = handle.await;
        }
        let _ = server_handle.await;
    };
    if tokio::time::timeout(deadline, drain).await.is_err() {
        warn!(timeout = ?deadline, "shutdown timed out, exiting anyway");
    }

    match orchestrator.scheduler().metrics() {
        Ok(metrics) => info!(?metrics, "tally-orchestrator exited"),
        Err(e) => warn!(error = %e, "tally-orchestrator exited without final metrics"),
    }
    Ok(())
}
