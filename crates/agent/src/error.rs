use tally_dispatch::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("worker '{0}' is already running")]
    AlreadyRunning(String),

    #[error("worker loop panicked: {0}")]
    LoopPanicked(String),
}
