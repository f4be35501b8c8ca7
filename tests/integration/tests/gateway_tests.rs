//! Gateway end-to-end tests
//!
//! Drive the session state machine over a real WebSocket against an
//! in-process server.
//!
//! Run with: cargo test -p flux-integration-tests --test gateway_tests

use std::time::Duration;

use flux_common::Credential;
use flux_gateway::protocol::PresenceUpdatePayload;
use flux_gateway::{
    ConnectionState, EventKind, GatewayEvent, GatewayFrame, GatewayHandle, LifecycleEvent,
    OpCode, SessionManager,
};
use flux_integration_tests::{GatewayServer, ServerSocket, TEST_TIMEOUT};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};

fn ready(session_id: &str, seq: u64) -> GatewayFrame {
    GatewayFrame::dispatch(
        "READY",
        seq,
        json!({
            "v": 1,
            "user": {"id": "1", "username": "bot", "bot": true},
            "guilds": [{"id": "100", "unavailable": true}],
            "session_id": session_id
        }),
    )
}

fn message_create(id: &str, content: &str, seq: u64) -> GatewayFrame {
    GatewayFrame::dispatch(
        "MESSAGE_CREATE",
        seq,
        json!({
            "id": id,
            "channel_id": "20",
            "author": {"id": "4", "username": "user"},
            "content": content
        }),
    )
}

fn spawn_client(gateway: &GatewayServer) -> GatewayHandle {
    let credential = Credential::parse("Bot secret-token").unwrap();
    SessionManager::spawn(credential, gateway.config()).unwrap()
}

async fn wait_state(handle: &GatewayHandle, state: ConnectionState) {
    tokio::time::timeout(TEST_TIMEOUT, handle.wait_for_state(|s| s == state))
        .await
        .expect("state never reached")
        .unwrap();
}

async fn next_lifecycle(
    rx: &mut broadcast::Receiver<LifecycleEvent>,
    mut matches: impl FnMut(&LifecycleEvent) -> bool,
) -> LifecycleEvent {
    tokio::time::timeout(TEST_TIMEOUT, async {
        loop {
            let event = rx.recv().await.unwrap();
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("lifecycle event never arrived")
}

/// Connect, identify and deliver READY for `session-1`
async fn handshake(handle: &GatewayHandle, gateway: &mut GatewayServer) -> ServerSocket {
    handle.connect().unwrap();
    let mut socket = gateway.accept().await.unwrap();

    socket.send(&GatewayFrame::hello(45_000)).await.unwrap();
    let identify = socket.recv_op(OpCode::Identify).await.unwrap();
    assert!(identify.as_identify().is_some());

    socket.send(&ready("session-1", 1)).await.unwrap();
    wait_state(handle, ConnectionState::Established).await;
    socket
}

// ============================================================================
// Handshake and dispatch
// ============================================================================

#[tokio::test]
async fn test_identify_ready_and_dispatch() {
    let mut gateway = GatewayServer::start().await.unwrap();
    let handle = spawn_client(&gateway);
    let mut lifecycle = handle.subscribe();

    let (tx, mut rx) = mpsc::unbounded_channel();
    handle.events().on(EventKind::MessageCreate, move |event| {
        if let GatewayEvent::MessageCreate(message) = event {
            tx.send(message.content.clone())?;
        }
        Ok(())
    });

    handle.connect().unwrap();
    let mut socket = gateway.accept().await.unwrap();
    socket.send(&GatewayFrame::hello(45_000)).await.unwrap();

    // The gateway only ever sees the raw token
    let identify = socket.recv_op(OpCode::Identify).await.unwrap();
    let payload = identify.as_identify().unwrap();
    assert_eq!(payload.token, "secret-token");
    assert!(!payload.properties.os.is_empty());

    socket.send(&ready("session-1", 1)).await.unwrap();
    let event = next_lifecycle(&mut lifecycle, |e| matches!(e, LifecycleEvent::Ready { .. })).await;
    assert_eq!(
        event,
        LifecycleEvent::Ready {
            session_id: "session-1".to_string()
        }
    );

    socket.send(&message_create("10", "hello", 2)).await.unwrap();
    let content = tokio::time::timeout(TEST_TIMEOUT, rx.recv()).await.unwrap();
    assert_eq!(content.as_deref(), Some("hello"));

    let snapshot = handle.snapshot();
    assert_eq!(snapshot.session_id(), Some("session-1"));
    assert_eq!(snapshot.last_seq(), Some(2));
    assert_eq!(snapshot.heartbeat_interval(), Some(Duration::from_millis(45_000)));

    handle.shutdown();
    assert_eq!(socket.recv_close().await.unwrap(), Some(1000));
    wait_state(&handle, ConnectionState::Terminated).await;
}

#[tokio::test]
async fn test_wait_for_matching_message() {
    let mut gateway = GatewayServer::start().await.unwrap();
    let handle = spawn_client(&gateway);
    let mut socket = handshake(&handle, &mut gateway).await;

    let events = handle.events().clone();
    let waiter = tokio::spawn(async move {
        events
            .wait_for(
                EventKind::MessageCreate,
                |event| matches!(event, GatewayEvent::MessageCreate(m) if m.content == "second"),
                TEST_TIMEOUT,
            )
            .await
    });

    // Let the waiter register before anything is dispatched
    while handle.events().waiter_count() == 0 {
        tokio::task::yield_now().await;
    }

    socket.send(&message_create("10", "first", 2)).await.unwrap();
    socket.send(&message_create("11", "second", 3)).await.unwrap();

    let event = waiter.await.unwrap().unwrap();
    match event {
        GatewayEvent::MessageCreate(message) => assert_eq!(message.id, "11"),
        other => panic!("unexpected event {other:?}"),
    }
    assert_eq!(handle.events().waiter_count(), 0);

    handle.shutdown();
}

#[tokio::test]
async fn test_outbound_presence_update() {
    let mut gateway = GatewayServer::start().await.unwrap();
    let handle = spawn_client(&gateway);
    let mut socket = handshake(&handle, &mut gateway).await;

    let presence = PresenceUpdatePayload::new("idle");
    handle.update_presence(&presence).unwrap();

    let frame = socket.recv_op(OpCode::PresenceUpdate).await.unwrap();
    assert_eq!(frame.d.unwrap()["status"], "idle");

    handle.shutdown();
}

// ============================================================================
// Heartbeats
// ============================================================================

#[tokio::test]
async fn test_heartbeat_ack_sets_latency() {
    let mut gateway = GatewayServer::start().await.unwrap();
    let handle = spawn_client(&gateway);

    handle.connect().unwrap();
    let mut socket = gateway.accept().await.unwrap();
    socket.send(&GatewayFrame::hello(50)).await.unwrap();
    socket.recv_op(OpCode::Identify).await.unwrap();
    socket.send(&ready("session-1", 1)).await.unwrap();

    let heartbeat = socket.recv_op(OpCode::Heartbeat).await.unwrap();
    assert!(heartbeat.as_heartbeat_seq().is_some());
    socket.send(&GatewayFrame::heartbeat_ack()).await.unwrap();

    tokio::time::timeout(TEST_TIMEOUT, async {
        while handle.latency().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("latency never recorded");

    handle.shutdown();
}

#[tokio::test]
async fn test_zombie_connection_is_resumed() {
    let mut gateway = GatewayServer::start().await.unwrap();
    let handle = spawn_client(&gateway);

    handle.connect().unwrap();
    let mut socket = gateway.accept().await.unwrap();
    socket.send(&GatewayFrame::hello(50)).await.unwrap();
    socket.recv_op(OpCode::Identify).await.unwrap();
    socket.send(&ready("session-1", 1)).await.unwrap();

    // Never acknowledge: the client gives up on this socket
    socket.recv_op(OpCode::Heartbeat).await.unwrap();
    assert_eq!(socket.recv_close().await.unwrap(), Some(4000));

    let mut socket = gateway.accept().await.unwrap();
    socket.send(&GatewayFrame::hello(45_000)).await.unwrap();
    let resume = socket.recv_op(OpCode::Resume).await.unwrap().as_resume().unwrap();
    assert_eq!(resume.session_id, "session-1");
    assert_eq!(resume.seq, 1);
    assert_eq!(resume.token, "secret-token");

    handle.shutdown();
}

// ============================================================================
// Reconnect and close codes
// ============================================================================

#[tokio::test]
async fn test_resume_after_server_close() {
    let mut gateway = GatewayServer::start().await.unwrap();
    let handle = spawn_client(&gateway);
    let mut lifecycle = handle.subscribe();
    let mut socket = handshake(&handle, &mut gateway).await;

    socket.send(&message_create("10", "before", 2)).await.unwrap();
    tokio::time::timeout(TEST_TIMEOUT, async {
        while handle.snapshot().last_seq() != Some(2) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    socket.close(4000, "restarting").await.unwrap();
    let closed =
        next_lifecycle(&mut lifecycle, |e| matches!(e, LifecycleEvent::Closed { .. })).await;
    assert_eq!(
        closed,
        LifecycleEvent::Closed {
            code: Some(4000),
            reason: "restarting".to_string()
        }
    );

    let mut socket = gateway.accept().await.unwrap();
    socket.send(&GatewayFrame::hello(45_000)).await.unwrap();
    let resume = socket.recv_op(OpCode::Resume).await.unwrap().as_resume().unwrap();
    assert_eq!((resume.session_id.as_str(), resume.seq), ("session-1", 2));

    socket
        .send(&GatewayFrame::dispatch("RESUMED", 3, json!({})))
        .await
        .unwrap();
    next_lifecycle(&mut lifecycle, |e| *e == LifecycleEvent::Resumed).await;
    wait_state(&handle, ConnectionState::Established).await;
    assert_eq!(handle.snapshot().last_seq(), Some(3));
    assert_eq!(handle.snapshot().reconnect_attempt(), 0);

    handle.shutdown();
}

#[tokio::test]
async fn test_invalid_session_falls_back_to_identify() {
    let mut gateway = GatewayServer::start().await.unwrap();
    let handle = spawn_client(&gateway);
    let socket = handshake(&handle, &mut gateway).await;

    socket.close(4009, "session timed out").await.unwrap();

    let mut socket = gateway.accept().await.unwrap();
    socket.send(&GatewayFrame::hello(45_000)).await.unwrap();
    socket.recv_op(OpCode::Resume).await.unwrap();
    socket
        .send(&GatewayFrame::invalid_session(false))
        .await
        .unwrap();

    let mut socket = gateway.accept().await.unwrap();
    socket.send(&GatewayFrame::hello(45_000)).await.unwrap();
    let identify = socket.recv_op(OpCode::Identify).await.unwrap();
    assert_eq!(identify.as_identify().unwrap().token, "secret-token");

    socket.send(&ready("session-2", 1)).await.unwrap();
    wait_state(&handle, ConnectionState::Established).await;
    assert_eq!(handle.snapshot().session_id(), Some("session-2"));

    handle.shutdown();
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    let mut gateway = GatewayServer::start().await.unwrap();
    let handle = spawn_client(&gateway);
    let mut lifecycle = handle.subscribe();

    handle.connect().unwrap();
    let mut socket = gateway.accept().await.unwrap();
    socket.send(&GatewayFrame::hello(45_000)).await.unwrap();
    socket.recv_op(OpCode::Identify).await.unwrap();
    socket.close(4004, "").await.unwrap();

    let fatal = next_lifecycle(&mut lifecycle, |e| matches!(e, LifecycleEvent::Fatal { .. })).await;
    assert!(matches!(fatal, LifecycleEvent::Fatal { code: Some(4004), .. }));
    wait_state(&handle, ConnectionState::Terminated).await;

    // No reconnect is attempted
    assert!(gateway
        .accept_within(Duration::from_millis(200))
        .await
        .is_err());
}
