//! Orchestrator process: wiring between configuration, storage, the
//! scheduler and the dispatch endpoint.

pub mod background;
pub mod startup;

pub use startup::{build_orchestrator, parse_tokens};
