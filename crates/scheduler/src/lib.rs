//! Distributed evaluation scheduler.
//!
//! The [`Scheduler`] owns every accepted expression tree together with the
//! dispatch state (pending queue and in-flight store) behind a single lock.
//! Workers only ever see [`TaskDescriptor`]s: one binary operation with both
//! operand values copied out of the tree.
//!
//! [`Orchestrator`] wraps the scheduler with the submission and query surface,
//! authentication, persistence and restart recovery.

pub mod auth;
pub mod error;
pub mod expression;
pub mod metrics;
pub mod registry;
pub mod service;
pub mod store;
pub mod task;

pub use auth::{AllowAll, AuthError, Authenticator, StaticTokens};
pub use error::SchedulerError;
pub use expression::{round_result, Expression, ExpressionStatus, ExpressionView};
pub use metrics::SchedulerMetrics;
pub use registry::{Applied, Dispatched, Scheduler};
pub use service::{Orchestrator, RecoveryReport};
pub use store::{ExpressionStore, JsonFileStore, MemoryStore, StoreError};
pub use task::{cost_of, Outcome, Task, TaskDescriptor};
