use std::time::Duration;

use async_trait::async_trait;
use tally_core::TaskId;
use tally_scheduler::{Outcome, TaskDescriptor};
use tracing::debug;

use crate::error::DispatchError;
use crate::message::Message;
use crate::protocol::{
    ErrorReply, FetchReply, FetchRequest, SubmitReply, SubmitRequest, ERROR, FETCH, FETCH_REPLY,
    SUBMIT, SUBMIT_REPLY,
};
use crate::reqrep::ZmqRequestClient;
use crate::traits::{Dispatcher, RequestSender};
use crate::transport::Transport;

/// Dispatcher for agents running in another process or on another host.
pub struct RemoteDispatcher<S = ZmqRequestClient> {
    sender: S,
    timeout: Duration,
}

impl RemoteDispatcher<ZmqRequestClient> {
    pub async fn connect(transport: &Transport, timeout: Duration) -> Result<Self, DispatchError> {
        let client = ZmqRequestClient::connect(transport).await?;
        Ok(Self::with_sender(client, timeout))
    }
}

impl<S: RequestSender> RemoteDispatcher<S> {
    pub fn with_sender(sender: S, timeout: Duration) -> Self {
        Self { sender, timeout }
    }

    /// Send one request and decode the reply expected on `reply_topic`.
    async fn call<Req, Rep>(
        &self,
        topic: &str,
        reply_topic: &str,
        request: &Req,
    ) -> Result<Rep, DispatchError>
    where
        Req: serde::Serialize + Sync,
        Rep: for<'de> serde::Deserialize<'de>,
    {
        let msg = Message::new(topic, request)?;
        let reply = self.sender.request(msg, self.timeout).await?;
        if reply.topic == reply_topic {
            reply.decode()
        } else if reply.topic == ERROR {
            let err: ErrorReply = reply.decode()?;
            Err(DispatchError::Remote(err.message))
        } else {
            Err(DispatchError::UnexpectedReply(reply.topic))
        }
    }
}

#[async_trait]
impl<S: RequestSender> Dispatcher for RemoteDispatcher<S> {
    async fn fetch(&self) -> Result<Option<TaskDescriptor>, DispatchError> {
        let reply: FetchReply = self.call(FETCH, FETCH_REPLY, &FetchRequest {}).await?;
        Ok(reply.into())
    }

    async fn submit(&self, task_id: TaskId, outcome: Outcome) -> Result<SubmitReply, DispatchError> {
        let request = SubmitRequest { task_id, outcome };
        let reply: SubmitReply = self.call(SUBMIT, SUBMIT_REPLY, &request).await?;
        debug!(%task_id, ?reply, "submit answered");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Answers every request with a canned reply built from the request.
    struct Canned<F>(Mutex<Vec<String>>, F);

    #[async_trait]
    impl<F> RequestSender for Canned<F>
    where
        F: Fn(&Message) -> Message + Send + Sync,
    {
        async fn request(&self, msg: Message, _timeout: Duration) -> Result<Message, DispatchError> {
            self.0.lock().unwrap().push(msg.topic.clone());
            Ok((self.1)(&msg))
        }
    }

    #[tokio::test]
    async fn decodes_error_replies() {
        let sender = Canned(Mutex::new(Vec::new()), |m: &Message| {
            m.reply(
                ERROR,
                &ErrorReply {
                    message: "boom".into(),
                },
            )
            .unwrap()
        });
        let remote = RemoteDispatcher::with_sender(sender, Duration::from_secs(1));
        match remote.fetch().await {
            Err(DispatchError::Remote(m)) => assert_eq!(m, "boom"),
            other => panic!("expected remote error, got {other:?}"),
        }
        assert_eq!(remote.sender.0.lock().unwrap().as_slice(), [FETCH]);
    }

    #[tokio::test]
    async fn rejects_mismatched_reply_topic() {
        let sender = Canned(Mutex::new(Vec::new()), |m: &Message| {
            m.reply(FETCH_REPLY, &FetchReply::Empty).unwrap()
        });
        let remote = RemoteDispatcher::with_sender(sender, Duration::from_secs(1));
        assert!(remote.fetch().await.unwrap().is_none());
        assert!(matches!(
            remote.submit(TaskId(1), Outcome::Value(1.0)).await,
            Err(DispatchError::UnexpectedReply(t)) if t == FETCH_REPLY
        ));
    }
}
