use std::path::Path;

use serde::{Deserialize, Serialize};
use tally_core::config::DispatchConfig;

/// Where the dispatch endpoint lives.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "address")]
pub enum Transport {
    /// Unix domain socket under `/tmp/tally/`, for agents on the same host.
    Ipc(String),

    Tcp { host: String, port: u16 },
}

impl Transport {
    pub fn ipc(name: &str) -> Self {
        Self::Ipc(name.to_string())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    pub fn from_config(config: &DispatchConfig) -> Self {
        Self::tcp(config.host.clone(), config.port)
    }

    pub fn endpoint(&self) -> String {
        match self {
            Self::Ipc(name) => format!("ipc:///tmp/tally/{name}.sock"),
            Self::Tcp { host, port } => format!("tcp://{host}:{port}"),
        }
    }

    fn ipc_path(&self) -> Option<String> {
        match self {
            Self::Ipc(_) => {
                let endpoint = self.endpoint();
                Some(endpoint.trim_start_matches("ipc://").to_string())
            }
            Self::Tcp { .. } => None,
        }
    }

    /// Prepare an IPC socket path for binding: create its directory and
    /// remove a socket file left behind by a previous run.
    pub fn prepare_bind(&self) -> std::io::Result<()> {
        let Some(path) = self.ipc_path() else {
            return Ok(());
        };
        if let Some(parent) = Path::new(&path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => tracing::debug!(path = %path, "removed stale IPC socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.endpoint())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        assert_eq!(
            Transport::ipc("dispatch").endpoint(),
            "ipc:///tmp/tally/dispatch.sock"
        );
        assert_eq!(
            Transport::tcp("127.0.0.1", 9090).to_string(),
            "tcp://127.0.0.1:9090"
        );
    }

    #[test]
    fn built_from_dispatch_config() {
        let config = DispatchConfig {
            host: "10.0.0.5".into(),
            port: 7000,
            timeout_ms: 100,
        };
        assert_eq!(
            Transport::from_config(&config),
            Transport::tcp("10.0.0.5", 7000)
        );
    }

    #[test]
    fn tcp_needs_no_preparation() {
        assert!(Transport::tcp("127.0.0.1", 1).prepare_bind().is_ok());
    }
}
