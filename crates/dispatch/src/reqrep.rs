//! Request/reply over ZeroMQ DEALER (agent side) and ROUTER (orchestrator side).
//!
//! Framing with zeromq-rs 0.4:
//! - DEALER sends `[topic, envelope]`
//! - ROUTER receives `[identity, topic, envelope]`
//! - ROUTER sends `[identity, topic, envelope]`; the identity frame is popped
//! - DEALER receives `[topic, envelope]`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use zeromq::prelude::*;
use zeromq::{DealerSocket, RouterSocket, ZmqMessage};

use crate::error::DispatchError;
use crate::message::Message;
use crate::traits::{RequestHandler, RequestSender};
use crate::transport::Transport;

/// Routing identity of the peer a request came from.
#[derive(Debug, Clone)]
pub struct ReplyToken {
    identity: Vec<u8>,
}

type PendingMap = Arc<Mutex<HashMap<Uuid, oneshot::Sender<Message>>>>;

/// DEALER client. Many callers can have requests outstanding at once; each
/// reply is routed back to its caller by correlation id.
///
/// The socket is owned by one background task that multiplexes outbound
/// requests from a channel with inbound replies.
pub struct ZmqRequestClient {
    send_tx: mpsc::Sender<ZmqMessage>,
    pending: PendingMap,
    _loop_handle: tokio::task::JoinHandle<()>,
}

impl ZmqRequestClient {
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn connect(transport: &Transport) -> Result<Self, DispatchError> {
        let mut socket = DealerSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "connecting DEALER socket");
        socket.connect(&endpoint).await?;

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (send_tx, send_rx) = mpsc::channel::<ZmqMessage>(256);

        let loop_pending = Arc::clone(&pending);
        let loop_handle = tokio::spawn(async move {
            Self::event_loop(socket, send_rx, loop_pending).await;
        });

        Ok(Self {
            send_tx,
            pending,
            _loop_handle: loop_handle,
        })
    }

    async fn event_loop(
        mut socket: DealerSocket,
        mut send_rx: mpsc::Receiver<ZmqMessage>,
        pending: PendingMap,
    ) {
        loop {
            tokio::select! {
                Some(zmq_msg) = send_rx.recv() => {
                    if let Err(e) = socket.send(zmq_msg).await {
                        warn!(error = %e, "DEALER send failed");
                    }
                }
                result = socket.recv() => {
                    match result {
                        Ok(zmq_msg) => Self::route_reply(&pending, zmq_msg).await,
                        Err(e) => {
                            debug!(error = %e, "DEALER recv loop ending");
                            break;
                        }
                    }
                }
                else => break,
            }
        }
    }

    async fn route_reply(pending: &Mutex<HashMap<Uuid, oneshot::Sender<Message>>>, zmq_msg: ZmqMessage) {
        let frames: Vec<_> = zmq_msg.iter().collect();
        // A ROUTER may prepend empty delimiter frames.
        let data: Vec<_> = frames.iter().skip_while(|f| f.as_ref().is_empty()).collect();
        if data.len() < 2 {
            warn!(frame_count = frames.len(), "unexpected frame count on DEALER recv");
            return;
        }

        let message = match Message::from_bytes(data[1].as_ref()) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "failed to decode reply envelope");
                return;
            }
        };

        let cid = message.correlation_id;
        match pending.lock().await.remove(&cid) {
            Some(tx) => {
                let _ = tx.send(message);
            }
            None => debug!(correlation_id = %cid, "reply for unknown or expired request"),
        }
    }
}

#[async_trait]
impl RequestSender for ZmqRequestClient {
    async fn request(&self, msg: Message, timeout: Duration) -> Result<Message, DispatchError> {
        let cid = msg.correlation_id;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(cid, tx);

        let mut zmq_msg = ZmqMessage::from(msg.topic.as_str());
        zmq_msg.push_back(msg.to_bytes()?.into());
        if self.send_tx.send(zmq_msg).await.is_err() {
            self.pending.lock().await.remove(&cid);
            return Err(DispatchError::Transport("client event loop closed".into()));
        }
        debug!(correlation_id = %cid, topic = %msg.topic, "sent request");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&cid);
                Err(DispatchError::Transport("reply channel closed unexpectedly".into()))
            }
            Err(_) => {
                self.pending.lock().await.remove(&cid);
                Err(DispatchError::Timeout(timeout))
            }
        }
    }
}

/// ROUTER server. Requests are received one at a time; the [`ReplyToken`]
/// returned with each routes the reply back to the right DEALER.
pub struct ZmqRequestServer {
    socket: Mutex<RouterSocket>,
}

impl ZmqRequestServer {
    #[instrument(skip_all, fields(endpoint = %transport))]
    pub async fn bind(transport: &Transport) -> Result<Self, DispatchError> {
        transport
            .prepare_bind()
            .map_err(|e| DispatchError::Transport(e.to_string()))?;
        let mut socket = RouterSocket::new();
        let endpoint = transport.endpoint();
        info!(endpoint = %endpoint, "binding ROUTER socket");
        socket.bind(&endpoint).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl RequestHandler for ZmqRequestServer {
    async fn recv_request(&self) -> Result<(ReplyToken, Message), DispatchError> {
        let mut socket = self.socket.lock().await;
        let zmq_msg = socket.recv().await?;

        let frames: Vec<_> = zmq_msg.iter().collect();
        let Some((identity, rest)) = frames.split_first() else {
            return Err(DispatchError::Transport("empty message on ROUTER".into()));
        };
        let data: Vec<_> = rest.iter().skip_while(|f| f.as_ref().is_empty()).collect();
        if data.len() < 2 {
            return Err(DispatchError::Transport(format!(
                "expected [topic, envelope] after identity, got {} frames",
                data.len()
            )));
        }

        let message = Message::from_bytes(data[1].as_ref())?;
        debug!(
            correlation_id = %message.correlation_id,
            topic = %message.topic,
            "received request"
        );
        Ok((
            ReplyToken {
                identity: identity.as_ref().to_vec(),
            },
            message,
        ))
    }

    async fn send_reply(&self, token: ReplyToken, reply: Message) -> Result<(), DispatchError> {
        let mut zmq_msg = ZmqMessage::from(token.identity);
        zmq_msg.push_back(reply.topic.as_bytes().to_vec().into());
        zmq_msg.push_back(reply.to_bytes()?.into());

        self.socket.lock().await.send(zmq_msg).await?;
        debug!(
            correlation_id = %reply.correlation_id,
            topic = %reply.topic,
            "sent reply"
        );
        Ok(())
    }
}
