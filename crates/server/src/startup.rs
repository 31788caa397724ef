//! Build the orchestrator from configuration and bring back stored work.

use std::sync::Arc;

use anyhow::Context;
use tally_core::Config;
use tally_scheduler::{
    AllowAll, Authenticator, JsonFileStore, Orchestrator, RecoveryReport, Scheduler, StaticTokens,
};
use tracing::info;

/// Parse `owner:token` pairs separated by commas.
pub fn parse_tokens(list: &str) -> anyhow::Result<StaticTokens> {
    let mut tokens = StaticTokens::new();
    for pair in list.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (owner, token) = pair
            .split_once(':')
            .with_context(|| format!("token entry '{pair}' is not owner:token"))?;
        let owner = owner.trim();
        anyhow::ensure!(!owner.is_empty(), "token entry '{pair}' has an empty owner");
        tokens = tokens.with(owner, token.trim());
    }
    Ok(tokens)
}

/// Open the JSON store under `config.storage.data_dir`, create the
/// orchestrator and recover every stored expression.
pub fn build_orchestrator(
    config: &Config,
    tokens: Option<&str>,
) -> anyhow::Result<(Arc<Orchestrator>, RecoveryReport)> {
    let store = JsonFileStore::new(&config.storage.data_dir).with_context(|| {
        format!(
            "failed to open expression store in {}",
            config.storage.data_dir.display()
        )
    })?;
    info!(dir = %store.dir().display(), "expression store ready");

    let auth: Arc<dyn Authenticator> = match tokens {
        Some(list) => {
            let tokens = parse_tokens(list)?;
            info!(owners = tokens.len(), "token authentication enabled");
            Arc::new(tokens)
        }
        None => {
            info!("no tokens configured, every owner is accepted");
            Arc::new(AllowAll)
        }
    };

    let scheduler = Scheduler::new(config.costs.clone()).with_lease(config.lease.lease_timeout());
    info!(
        lease = ?scheduler.lease(),
        costs = ?scheduler.costs(),
        "scheduler ready"
    );
    let orchestrator = Arc::new(Orchestrator::new(scheduler, Arc::new(store), auth));
    let report = orchestrator.recover().context("failed to recover stored expressions")?;
    Ok((orchestrator, report))
}
