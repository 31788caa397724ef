use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub costs: CostConfig,
    pub agent: AgentConfig,
    pub dispatch: DispatchConfig,
    pub lease: LeaseConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TALLY_PROFILE`. When set (e.g. `PROD`), every key
    /// is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TALLY_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            costs: CostConfig::from_env_profiled(p),
            agent: AgentConfig::from_env_profiled(p),
            dispatch: DispatchConfig::from_env_profiled(p),
            lease: LeaseConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a one-line-per-section summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!(
            "  costs:     +={}ms -={}ms *={}ms /={}ms",
            self.costs.addition_ms,
            self.costs.subtraction_ms,
            self.costs.multiplication_ms,
            self.costs.division_ms
        );
        tracing::info!(
            "  agent:     computing_power={}, poll={}ms",
            self.agent.computing_power,
            self.agent.poll_interval_ms
        );
        tracing::info!("  dispatch:  endpoint={}:{}", self.dispatch.host, self.dispatch.port);
        tracing::info!(
            "  lease:     timeout={}s, reap_every={}ms",
            self.lease.lease_secs,
            self.lease.reap_interval_ms
        );
        tracing::info!("  storage:   data_dir={}", self.storage.data_dir.display());
    }

    /// Return a JSON view of the effective config.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "costs": self.costs,
            "agent": self.agent,
            "dispatch": { "host": self.dispatch.host, "port": self.dispatch.port },
            "lease": self.lease,
            "storage": { "data_dir": self.storage.data_dir },
        })
    }
}

// ── Operation costs ───────────────────────────────────────────

/// Simulated per-operator latency attached to every task at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CostConfig {
    pub addition_ms: u64,
    pub subtraction_ms: u64,
    pub multiplication_ms: u64,
    pub division_ms: u64,
}

impl CostConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            addition_ms: profiled_env_u64(p, "TIME_ADDITION_MS", 100),
            subtraction_ms: profiled_env_u64(p, "TIME_SUBTRACTION_MS", 100),
            multiplication_ms: profiled_env_u64(p, "TIME_MULTIPLICATIONS_MS", 1000),
            division_ms: profiled_env_u64(p, "TIME_DIVISIONS_MS", 1000),
        }
    }

    /// All operators free. Handy for tests and local dry runs.
    pub fn zero() -> Self {
        Self {
            addition_ms: 0,
            subtraction_ms: 0,
            multiplication_ms: 0,
            division_ms: 0,
        }
    }
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            addition_ms: 100,
            subtraction_ms: 100,
            multiplication_ms: 1000,
            division_ms: 1000,
        }
    }
}

// ── Agent ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    /// Number of independent polling loops.
    pub computing_power: usize,
    /// Pause after an empty fetch or a transport failure.
    pub poll_interval_ms: u64,
}

impl AgentConfig {
    fn from_env_profiled(p: &str) -> Self {
        let computing_power = profiled_env_u64(p, "COMPUTING_POWER", 1).max(1) as usize;
        Self {
            computing_power,
            poll_interval_ms: profiled_env_u64(p, "AGENT_POLL_INTERVAL_MS", 500),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            computing_power: 1,
            poll_interval_ms: 500,
        }
    }
}

// ── Dispatch endpoint ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub host: String,
    pub port: u16,
    /// Per-request timeout used by remote clients.
    pub timeout_ms: u64,
}

impl DispatchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "DISPATCH_HOST", "127.0.0.1"),
            port: profiled_env_u16(p, "DISPATCH_PORT", 9090),
            timeout_ms: profiled_env_u64(p, "DISPATCH_TIMEOUT_MS", 5000),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ── Task leases ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LeaseConfig {
    /// Seconds a fetched task may stay unanswered before it is re-queued. 0 disables.
    pub lease_secs: u64,
    pub reap_interval_ms: u64,
}

impl LeaseConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            lease_secs: profiled_env_u64(p, "TASK_LEASE_SECS", 30),
            reap_interval_ms: profiled_env_u64(p, "LEASE_REAP_INTERVAL_MS", 1000),
        }
    }

    pub fn lease_timeout(&self) -> Option<Duration> {
        if self.lease_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.lease_secs))
        }
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_millis(self.reap_interval_ms.max(1))
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_secs: 30,
            reap_interval_ms: 1000,
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiled_keys_take_precedence() {
        // Unique profile name keeps this test independent of the real environment.
        env::set_var("CFGTEST_TIME_ADDITION_MS", "7");
        env::set_var("CFGTEST_COMPUTING_POWER", "0");
        env::set_var("CFGTEST_TASK_LEASE_SECS", "0");

        let config = Config::for_profile("cfgtest");
        assert_eq!(config.profile, "CFGTEST");
        assert_eq!(config.costs.addition_ms, 7);
        // Values below one clamp to a single worker loop.
        assert_eq!(config.agent.computing_power, 1);
        assert_eq!(config.lease.lease_timeout(), None);
    }

    #[test]
    fn cost_defaults_model_heavier_mul_div() {
        let costs = CostConfig::default();
        assert_eq!(costs.addition_ms, 100);
        assert_eq!(costs.subtraction_ms, 100);
        assert_eq!(costs.multiplication_ms, 1000);
        assert_eq!(costs.division_ms, 1000);
    }

    #[test]
    fn lease_defaults() {
        let lease = LeaseConfig::default();
        assert_eq!(lease.lease_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(lease.reap_interval(), Duration::from_secs(1));
    }

    #[test]
    fn summary_has_sections() {
        let config = Config::for_profile("cfgtest-summary");
        let summary = config.summary();
        assert!(summary.get("costs").is_some());
        assert!(summary.get("dispatch").is_some());
        assert_eq!(summary["profile"], "CFGTEST-SUMMARY");
    }
}
