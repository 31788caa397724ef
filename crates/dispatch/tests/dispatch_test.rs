//! Remote fetch/submit through a real ROUTER/DEALER pair.

use std::sync::Arc;
use std::time::Duration;

use tally_core::config::CostConfig;
use tally_core::{OwnerId, TaskId};
use tally_dispatch::protocol::{ErrorReply, ERROR, FETCH};
use tally_dispatch::{
    DispatchError, DispatchServer, Dispatcher, LocalDispatcher, Message, RemoteDispatcher,
    RequestSender, SubmitReply, Transport, ZmqRequestClient, ZmqRequestServer,
};
use tally_scheduler::{ExpressionStatus, Orchestrator, Outcome};
use tokio::sync::Notify;

const SETTLE: Duration = Duration::from_millis(200);
const TIMEOUT: Duration = Duration::from_secs(5);

async fn start(port: u16) -> (Arc<Orchestrator>, Arc<Notify>, Transport) {
    let transport = Transport::tcp("127.0.0.1", port);
    let orch = Arc::new(Orchestrator::in_memory(CostConfig::zero()));
    let backend = Arc::new(LocalDispatcher::new(orch.clone()));
    let server = DispatchServer::bind(&transport, backend).await.unwrap();
    let shutdown = Arc::new(Notify::new());
    let stop = shutdown.clone();
    tokio::spawn(async move { server.serve(stop).await });
    tokio::time::sleep(SETTLE).await;
    (orch, shutdown, transport)
}

#[tokio::test]
async fn remote_agent_drives_expression_to_completion() {
    let (orch, shutdown, transport) = start(17500).await;
    let id = orch.submit("3+4*2", &OwnerId::new("alice"), "").unwrap();

    let remote = RemoteDispatcher::connect(&transport, TIMEOUT).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let mut handed_out = Vec::new();
    while let Some(task) = remote.fetch().await.unwrap() {
        let op = tally_expr::Operator::from_symbol(&task.operator).unwrap();
        let value = op.apply(task.left, task.right).unwrap();
        let reply = remote.submit(task.task_id, Outcome::Value(value)).await.unwrap();
        assert_eq!(reply, SubmitReply::Ack);
        handed_out.push((task.task_id, task.operator));
    }

    let operators: Vec<&str> = handed_out.iter().map(|(_, op)| op.as_str()).collect();
    assert_eq!(operators, ["*", "+"]);
    let view = orch.status(id).unwrap();
    assert_eq!(view.status, ExpressionStatus::Completed);
    assert_eq!(view.result, Some(11.0));

    let first: TaskId = handed_out[0].0;
    let stale = remote.submit(first, Outcome::Value(8.0)).await.unwrap();
    assert_eq!(stale, SubmitReply::UnknownTask(first));

    shutdown.notify_one();
}

#[tokio::test]
async fn unknown_topic_gets_error_reply() {
    let (_orch, shutdown, transport) = start(17510).await;

    let client = ZmqRequestClient::connect(&transport).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let msg = Message::new("tally.dispatch.bogus", &()).unwrap();
    let cid = msg.correlation_id;
    let reply = client.request(msg, TIMEOUT).await.unwrap();
    assert_eq!(reply.correlation_id, cid);
    assert_eq!(reply.topic, ERROR);
    let err: ErrorReply = reply.decode().unwrap();
    assert!(err.message.contains("tally.dispatch.bogus"));

    // A well-formed request on the same connection still works.
    let reply = client.request(Message::new(FETCH, &()).unwrap(), TIMEOUT).await.unwrap();
    assert_ne!(reply.topic, ERROR);

    shutdown.notify_one();
}

#[tokio::test]
async fn silent_server_times_out() {
    let transport = Transport::tcp("127.0.0.1", 17520);
    let _server = ZmqRequestServer::bind(&transport).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let short = Duration::from_millis(300);
    let remote = RemoteDispatcher::connect(&transport, short).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    match remote.fetch().await {
        Err(DispatchError::Timeout(d)) => assert_eq!(d, short),
        other => panic!("expected timeout, got {other:?}"),
    }
}
