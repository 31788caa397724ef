//! Moves tasks between the orchestrator and the agents that compute them.
//!
//! In-process workers use [`LocalDispatcher`]; remote agents use
//! [`RemoteDispatcher`], which speaks a MessagePack request/reply protocol
//! over ZeroMQ to a [`DispatchServer`].

pub mod client;
pub mod error;
pub mod local;
pub mod message;
pub mod protocol;
pub mod reqrep;
pub mod server;
pub mod traits;
pub mod transport;

pub use client::RemoteDispatcher;
pub use error::DispatchError;
pub use local::LocalDispatcher;
pub use message::{Message, PROTOCOL_VERSION};
pub use protocol::{FetchReply, SubmitReply};
pub use reqrep::{ReplyToken, ZmqRequestClient, ZmqRequestServer};
pub use server::DispatchServer;
pub use traits::{Dispatcher, RequestHandler, RequestSender};
pub use transport::Transport;
