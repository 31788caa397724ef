//! Topics and payloads of the dispatch protocol.
//!
//! | Request topic | Request payload | Reply topic | Reply payload |
//! |---|---|---|---|
//! | [`FETCH`] | [`FetchRequest`] | [`FETCH_REPLY`] | [`FetchReply`] |
//! | [`SUBMIT`] | [`SubmitRequest`] | [`SUBMIT_REPLY`] | [`SubmitReply`] |
//!
//! Anything the server cannot handle is answered on [`ERROR`] with an [`ErrorReply`].

use serde::{Deserialize, Serialize};
use tally_core::TaskId;
use tally_scheduler::{Outcome, TaskDescriptor};

pub const FETCH: &str = "tally.dispatch.fetch";
pub const FETCH_REPLY: &str = "tally.dispatch.fetch.reply";
pub const SUBMIT: &str = "tally.dispatch.submit";
pub const SUBMIT_REPLY: &str = "tally.dispatch.submit.reply";
pub const ERROR: &str = "tally.dispatch.error";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchRequest {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FetchReply {
    Task(TaskDescriptor),
    /// Nothing to do right now; poll again later.
    Empty,
}

impl From<Option<TaskDescriptor>> for FetchReply {
    fn from(task: Option<TaskDescriptor>) -> Self {
        match task {
            Some(task) => FetchReply::Task(task),
            None => FetchReply::Empty,
        }
    }
}

impl From<FetchReply> for Option<TaskDescriptor> {
    fn from(reply: FetchReply) -> Self {
        match reply {
            FetchReply::Task(task) => Some(task),
            FetchReply::Empty => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub task_id: TaskId,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SubmitReply {
    Ack,
    /// Not in the in-flight store: already answered, reclaimed and answered
    /// elsewhere, or its expression was dropped.
    UnknownTask(TaskId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub message: String,
}
