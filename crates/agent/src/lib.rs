//! Worker side of tally: a pool of polling loops that turn fetched tasks
//! into submitted results.

pub mod compute;
pub mod error;
pub mod pool;
pub mod worker;

pub use compute::compute;
pub use error::AgentError;
pub use pool::{PoolSnapshot, WorkerPool};
pub use worker::{shutdown_signal, Worker, WorkerRunner};
