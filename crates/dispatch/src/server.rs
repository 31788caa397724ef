use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::message::{Message, PROTOCOL_VERSION};
use crate::protocol::{
    ErrorReply, FetchReply, SubmitRequest, ERROR, FETCH, FETCH_REPLY, SUBMIT, SUBMIT_REPLY,
};
use crate::reqrep::ZmqRequestServer;
use crate::traits::{Dispatcher, RequestHandler};
use crate::transport::Transport;

/// Serves Fetch and Submit for remote agents on a ROUTER socket.
pub struct DispatchServer<H = ZmqRequestServer> {
    handler: H,
    backend: Arc<dyn Dispatcher>,
}

impl DispatchServer<ZmqRequestServer> {
    pub async fn bind(
        transport: &Transport,
        backend: Arc<dyn Dispatcher>,
    ) -> Result<Self, DispatchError> {
        let handler = ZmqRequestServer::bind(transport).await?;
        Ok(Self::with_handler(handler, backend))
    }
}

impl<H: RequestHandler> DispatchServer<H> {
    pub fn with_handler(handler: H, backend: Arc<dyn Dispatcher>) -> Self {
        Self { handler, backend }
    }

    /// Answer requests until `shutdown` is notified.
    pub async fn serve(&self, shutdown: Arc<Notify>) {
        info!("dispatch server ready");
        loop {
            tokio::select! {
                result = self.handler.recv_request() => {
                    match result {
                        Ok((token, msg)) => {
                            let reply = self.handle(&msg).await;
                            if let Err(e) = self.handler.send_reply(token, reply).await {
                                warn!(error = %e, "failed to send dispatch reply");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "dispatch server recv error");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
                _ = shutdown.notified() => {
                    info!("dispatch server shutting down");
                    break;
                }
            }
        }
    }

    /// Build the reply for one request. Never fails: problems become an
    /// [`ErrorReply`] on the error topic.
    pub async fn handle(&self, msg: &Message) -> Message {
        match self.answer(msg).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(topic = %msg.topic, correlation_id = %msg.correlation_id, error = %e, "dispatch request failed");
                error_reply(msg, e.to_string())
            }
        }
    }

    async fn answer(&self, msg: &Message) -> Result<Message, DispatchError> {
        if msg.version > PROTOCOL_VERSION {
            return Err(DispatchError::Transport(format!(
                "unsupported protocol version {}",
                msg.version
            )));
        }
        match msg.topic.as_str() {
            FETCH => {
                let reply = FetchReply::from(self.backend.fetch().await?);
                if let FetchReply::Task(task) = &reply {
                    info!(
                        task_id = %task.task_id,
                        expression_id = %task.expression_id,
                        operator = %task.operator,
                        "task handed out"
                    );
                }
                msg.reply(FETCH_REPLY, &reply)
            }
            SUBMIT => {
                let request: SubmitRequest = msg.decode()?;
                let reply = self.backend.submit(request.task_id, request.outcome).await?;
                msg.reply(SUBMIT_REPLY, &reply)
            }
            other => Err(DispatchError::UnexpectedReply(other.to_string())),
        }
    }
}

fn error_reply(request: &Message, message: String) -> Message {
    let payload = ErrorReply { message };
    match request.reply(ERROR, &payload) {
        Ok(reply) => reply,
        // Encoding a single string cannot realistically fail; fall back to an empty payload.
        Err(_) => Message {
            topic: ERROR.to_string(),
            payload: Vec::new(),
            timestamp: chrono::Utc::now(),
            correlation_id: request.correlation_id,
            version: PROTOCOL_VERSION,
        },
    }
}
