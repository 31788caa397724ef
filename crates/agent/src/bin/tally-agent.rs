//! tally-agent: remote worker pool.
//!
//! Connects a DEALER socket to the orchestrator's dispatch endpoint and runs
//! `COMPUTING_POWER` loops that fetch, compute and submit tasks until SIGINT
//! or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;

use tally_agent::{WorkerPool, WorkerRunner};
use tally_core::config::{load_dotenv, Config};
use tally_dispatch::{RemoteDispatcher, Transport};

/// Tally agent: computes arithmetic tasks handed out by an orchestrator.
#[derive(Parser, Debug)]
#[command(name = "tally-agent", version, about)]
struct Cli {
    /// Orchestrator host (overrides DISPATCH_HOST).
    #[arg(long)]
    dispatch_host: Option<String>,

    /// Orchestrator dispatch port (overrides DISPATCH_PORT).
    #[arg(long)]
    dispatch_port: Option<u16>,

    /// Number of worker loops (overrides COMPUTING_POWER).
    #[arg(long)]
    workers: Option<usize>,

    /// Shutdown timeout in seconds.
    #[arg(long, env = "AGENT_SHUTDOWN_TIMEOUT", default_value_t = 10)]
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
    if let Some(host) = cli.dispatch_host {
        config.dispatch.host = host;
    }
    if let Some(port) = cli.dispatch_port {
        config.dispatch.port = port;
    }
    if let Some(workers) = cli.workers {
        config.agent.computing_power = workers.max(1);
    }
    config.log_summary();

    let transport = Transport::from_config(&config.dispatch);
    let remote = RemoteDispatcher::connect(&transport, config.dispatch.timeout()).await?;
    info!(endpoint = %transport, "connected to orchestrator");

    let pool = Arc::new(WorkerPool::new("tally-agent", Arc::new(remote), config.agent.clone()));
    WorkerRunner::run(pool.clone(), Duration::from_secs(cli.shutdown_timeout), None).await?;
    info!(stats = ?pool.stats(), "tally-agent exited cleanly");

    Ok(())
}
