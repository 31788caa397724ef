use std::time::Duration;

use tally_scheduler::SchedulerError;
use thiserror::Error;

/// Errors raised while fetching or submitting work, locally or over the wire.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("zeromq error: {0}")]
    Zmq(#[from] zeromq::ZmqError),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("no reply after {0:?}")]
    Timeout(Duration),

    /// The server answered with an error reply.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("unexpected reply topic '{0}'")]
    UnexpectedReply(String),

    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("scheduler call did not finish: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DispatchError {
    /// Failures a polling worker should ride out by pausing and retrying.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DispatchError::Zmq(_) | DispatchError::Transport(_) | DispatchError::Timeout(_)
        )
    }
}
