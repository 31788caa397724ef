use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tally_core::TaskId;
use tally_scheduler::{Outcome, TaskDescriptor};

use crate::error::DispatchError;
use crate::message::Message;
use crate::protocol::SubmitReply;
use crate::reqrep::ReplyToken;

/// Client half of a request/reply channel.
#[async_trait]
pub trait RequestSender: Send + Sync {
    /// Send `msg` and wait up to `timeout` for the reply with the same correlation id.
    async fn request(&self, msg: Message, timeout: Duration) -> Result<Message, DispatchError>;
}

/// Server half of a request/reply channel.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn recv_request(&self) -> Result<(ReplyToken, Message), DispatchError>;

    async fn send_reply(&self, token: ReplyToken, reply: Message) -> Result<(), DispatchError>;
}

/// The two operations a worker needs: pull one task, push one outcome.
///
/// Both are safe to call from any number of workers at once.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// `Ok(None)` means no task is available right now.
    async fn fetch(&self) -> Result<Option<TaskDescriptor>, DispatchError>;

    async fn submit(&self, task_id: TaskId, outcome: Outcome) -> Result<SubmitReply, DispatchError>;
}

#[async_trait]
impl<T: Dispatcher + ?Sized> Dispatcher for Arc<T> {
    async fn fetch(&self) -> Result<Option<TaskDescriptor>, DispatchError> {
        (**self).fetch().await
    }

    async fn submit(&self, task_id: TaskId, outcome: Outcome) -> Result<SubmitReply, DispatchError> {
        (**self).submit(task_id, outcome).await
    }
}
