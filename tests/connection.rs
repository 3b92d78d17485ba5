//! End-to-end connection behavior against an in-memory agent.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::oneshot;
use tokio::time::{sleep, timeout};

use sandbox_agent_client::{
    Codec, Connection, ConnectionConfig, ConnectionState, Envelope, Error, JsonCodec, OutboundRequest,
    ReconnectOutcome, RequestOptions, Result, TransportOptions,
};

use common::{Harness, MemoryConnector, WAIT, connect, credentials, eventually, init_tracing, next_agent};

// ============================================================================
// Request / Response
// ============================================================================

#[tokio::test]
async fn test_request_round_trip() {
    init_tracing();
    let Harness {
        connection,
        mut agent,
        joined,
        ..
    } = connect(ConnectionConfig::default()).await;
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert_eq!(joined.reconnect_token.as_deref(), Some("rt-1"));

    let call = tokio::spawn({
        let connection = connection.clone();
        async move { connection.request("echo", json!({"x": 1})).await }
    });

    let request = agent.next_request().await;
    assert_eq!(request.method, "echo");
    assert_eq!(request.params, json!({"x": 1}));
    agent.respond(&request, json!({"x": 1})).await;

    let result = timeout(WAIT, call)
        .await
        .expect("in time")
        .expect("join")
        .expect("ok");
    assert_eq!(result, json!({"x": 1}));
    assert_eq!(connection.pending_count(), 0);
    connection.dispose();
}

#[tokio::test]
async fn test_responses_out_of_order() {
    let Harness {
        connection,
        mut agent,
        ..
    } = connect(ConnectionConfig::default()).await;

    let first = connection
        .start_request("a", json!(null), RequestOptions::default())
        .expect("a");
    let second = connection
        .start_request("b", json!(null), RequestOptions::default())
        .expect("b");
    assert!(second.id() > first.id());

    let ra = agent.next_request().await;
    let rb = agent.next_request().await;
    agent.respond(&rb, json!("B")).await;
    agent.respond(&ra, json!("A")).await;

    assert_eq!(second.result().await.expect("b"), json!("B"));
    assert_eq!(first.result().await.expect("a"), json!("A"));
    connection.dispose();
}

#[tokio::test]
async fn test_protocol_error_surfaces_on_request() {
    let Harness {
        connection,
        mut agent,
        ..
    } = connect(ConnectionConfig::default()).await;

    let call = tokio::spawn({
        let connection = connection.clone();
        async move { connection.request("fs/stat", json!({"path": "/nope"})).await }
    });
    let request = agent.next_request().await;
    agent.respond_error(&request, 404, "no such file").await;

    let err = call.await.expect("join").unwrap_err();
    assert!(err.is_protocol_error());
    assert_eq!(err.protocol_code(), Some(404));
    assert!(connection.is_connected());
    connection.dispose();
}

#[tokio::test]
async fn test_request_timeout_then_late_response_ignored() {
    let Harness {
        connection,
        mut agent,
        ..
    } = connect(ConnectionConfig::default()).await;

    let handle = connection
        .start_request(
            "slow",
            json!({}),
            RequestOptions::new().with_timeout(Duration::from_millis(50)),
        )
        .expect("start");
    let request = agent.next_request().await;

    let err = handle.result().await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(connection.pending_count(), 0);

    agent.respond(&request, json!("late")).await;
    sleep(Duration::from_millis(50)).await;
    assert!(connection.is_connected());
    assert_eq!(connection.pending_count(), 0);
    connection.dispose();
}

// ============================================================================
// Notifications
// ============================================================================

#[tokio::test]
async fn test_notification_fan_out_in_order_and_unsubscribe() {
    let Harness {
        connection,
        mut agent,
        ..
    } = connect(ConnectionConfig::default()).await;
    let log = Arc::new(Mutex::new(Vec::new()));

    let l1 = Arc::clone(&log);
    let first = connection.on_notification("task/update", move |params| {
        l1.lock().push(format!("first:{}", params["n"]));
    });
    let l2 = Arc::clone(&log);
    let _second = connection.on_notification("task/update", move |params| {
        l2.lock().push(format!("second:{}", params["n"]));
    });

    agent.notify("task/update", json!({"n": 1})).await;
    eventually(|| log.lock().len() == 2).await;

    first.unsubscribe();
    agent.notify("task/update", json!({"n": 2})).await;
    eventually(|| log.lock().len() == 3).await;

    assert_eq!(*log.lock(), vec!["first:1", "second:1", "second:2"]);
    connection.dispose();
}

#[tokio::test]
async fn test_undecodable_frame_keeps_connection() {
    let Harness {
        connection,
        mut agent,
        ..
    } = connect(ConnectionConfig::default()).await;
    let seen = Arc::new(AtomicUsize::new(0));
    let s = Arc::clone(&seen);
    let _sub = connection.on_notification("port/changed", move |_| {
        s.fetch_add(1, Ordering::SeqCst);
    });

    agent.send_raw(b"{\"method\":".to_vec()).await;
    agent.notify("port/changed", json!({"ports": []})).await;

    eventually(|| seen.load(Ordering::SeqCst) == 1).await;
    assert!(connection.is_connected());
    connection.dispose();
}

#[tokio::test]
async fn test_join_declares_subscriptions_and_tokens() {
    let (connector, mut agents) = MemoryConnector::new();
    let config = ConnectionConfig::new().with_subscription("shell/out");
    let creds = credentials("t-0");

    let (connected, accepted) = tokio::join!(
        Connection::connect(Arc::new(connector), &creds, Some("rt-0"), config),
        async {
            let mut agent = next_agent(&mut agents).await;
            assert_eq!(agent.query("token").as_deref(), Some("t-0"));
            assert_eq!(agent.query("reconnectToken").as_deref(), Some("rt-0"));
            let join = agent.accept_join("rt-1").await;
            (join, agent)
        }
    );
    let (connection, joined) = connected.expect("connect");
    let (join, _agent) = accepted;

    assert_eq!(joined.reconnect_token.as_deref(), Some("rt-1"));
    assert_eq!(join.params["subscriptions"], json!(["shell/out"]));
    assert_eq!(join.params["asyncProgress"], json!(true));
    assert_eq!(join.params["clientInfo"]["protocolVersion"], json!("1.0"));
    connection.dispose();
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    let (connector, _agents) = MemoryConnector::new();
    connector.set_refuse(true);

    let err = Connection::connect(
        Arc::new(connector),
        &credentials("t-0"),
        None,
        ConnectionConfig::default(),
    )
    .await
    .unwrap_err();
    assert!(err.is_connection_error());
}

/// JSON codec that counts the frames it handles.
#[derive(Default)]
struct CountingCodec {
    encoded: AtomicUsize,
    decoded: AtomicUsize,
}

impl Codec for CountingCodec {
    fn encode(&self, request: &OutboundRequest) -> Result<Vec<u8>> {
        self.encoded.fetch_add(1, Ordering::SeqCst);
        JsonCodec.encode(request)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Envelope> {
        self.decoded.fetch_add(1, Ordering::SeqCst);
        JsonCodec.decode(bytes)
    }
}

#[tokio::test]
async fn test_connect_with_custom_codec() {
    let (connector, mut agents) = MemoryConnector::new();
    let codec = Arc::new(CountingCodec::default());
    let creds = credentials("t-0");

    let (connected, mut agent) = tokio::join!(
        Connection::connect_with(
            Arc::new(connector),
            Arc::clone(&codec) as Arc<dyn Codec>,
            &creds,
            None,
            ConnectionConfig::default(),
        ),
        async {
            let mut agent = next_agent(&mut agents).await;
            agent.accept_join("rt-1").await;
            agent
        }
    );
    let (connection, joined) = connected.expect("connect");
    assert_eq!(joined.reconnect_token.as_deref(), Some("rt-1"));
    assert_eq!(codec.encoded.load(Ordering::SeqCst), 1);
    assert_eq!(codec.decoded.load(Ordering::SeqCst), 1);

    let (result, _) = tokio::join!(connection.request("system/metrics", json!({})), async {
        let request = agent.next_request().await;
        agent.respond(&request, json!({"cpuPercent": 2.0})).await;
    });
    assert_eq!(result.expect("result")["cpuPercent"], 2.0);
    assert_eq!(codec.encoded.load(Ordering::SeqCst), 2);
    assert_eq!(codec.decoded.load(Ordering::SeqCst), 2);
    connection.dispose();
}

// ============================================================================
// Disconnect / Reconnect
// ============================================================================

#[tokio::test]
async fn test_transport_loss_then_reconnect() {
    init_tracing();
    let Harness {
        connection,
        mut agent,
        mut agents,
        ..
    } = connect(ConnectionConfig::default()).await;

    let states = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&states);
    let _sub = connection.on_state_change(move |state| s.lock().push(*state));

    let old_transport = connection.transport_id();
    agent.close().await;
    eventually(|| connection.state() == ConnectionState::Disconnected).await;
    sleep(Duration::from_millis(20)).await;
    assert_eq!(*states.lock(), vec![ConnectionState::Disconnected]);
    assert_eq!(connection.transport_id(), None);

    let refreshes = Arc::new(AtomicUsize::new(0));
    let r = Arc::clone(&refreshes);
    let (outcome, mut agent) = tokio::join!(
        connection.reconnect(Some("rt-1".into()), move || async move {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(credentials("t-fresh"))
        }),
        async {
            let mut agent = next_agent(&mut agents).await;
            assert_eq!(agent.query("token").as_deref(), Some("t-fresh"));
            assert_eq!(agent.query("reconnectToken").as_deref(), Some("rt-1"));
            agent.accept_join("rt-2").await;
            agent
        }
    );

    let outcome = outcome.expect("reconnect");
    assert_eq!(outcome.reconnect_token(), Some("rt-2"));
    assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    assert_eq!(connection.state(), ConnectionState::Connected);
    assert!(connection.transport_id().is_some());
    assert_ne!(connection.transport_id(), old_transport);
    assert_eq!(
        *states.lock(),
        vec![
            ConnectionState::Disconnected,
            ConnectionState::Connecting,
            ConnectionState::Connected
        ]
    );

    // The new transport carries requests.
    let call = tokio::spawn({
        let connection = connection.clone();
        async move { connection.request("system/metrics", json!({})).await }
    });
    let request = agent.next_request().await;
    agent.respond(&request, json!({"cpuPercent": 1.0})).await;
    assert_eq!(call.await.expect("join").expect("ok")["cpuPercent"], 1.0);
    connection.dispose();
}

#[tokio::test]
async fn test_concurrent_reconnects_join_once() {
    let Harness {
        connection,
        mut agent,
        mut agents,
        connector,
        ..
    } = connect(ConnectionConfig::default()).await;
    agent.close().await;
    eventually(|| connection.state() == ConnectionState::Disconnected).await;

    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate_rx)));

    let first = tokio::spawn({
        let connection = connection.clone();
        let gate = Arc::clone(&gate);
        async move {
            connection
                .reconnect(Some("rt-1".into()), move || async move {
                    let rx = gate.lock().take();
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Ok(credentials("t-1"))
                })
                .await
        }
    });
    eventually(|| connection.state() == ConnectionState::Connecting).await;

    let second = connection
        .reconnect(Some("rt-1".into()), || async { Ok(credentials("t-2")) })
        .await
        .expect("second");
    assert_eq!(
        second,
        ReconnectOutcome::Skipped {
            state: ConnectionState::Connecting
        }
    );

    let _ = gate_tx.send(());
    let mut agent = next_agent(&mut agents).await;
    assert_eq!(agent.query("token").as_deref(), Some("t-1"));
    agent.accept_join("rt-2").await;

    let first = first.await.expect("join").expect("first");
    assert!(first.is_reconnected());
    assert_eq!(connector.connects(), 2);
    assert!(agents.try_recv().is_err());
    connection.dispose();
}

#[tokio::test]
async fn test_join_failure_reverts_to_disconnected() {
    let Harness {
        connection,
        mut agent,
        mut agents,
        ..
    } = connect(ConnectionConfig::default()).await;
    agent.close().await;
    eventually(|| connection.state() == ConnectionState::Disconnected).await;

    let (outcome, _rejecting) = tokio::join!(
        connection.reconnect(None, || async { Ok(credentials("t-1")) }),
        async {
            let mut agent = next_agent(&mut agents).await;
            let join = agent.next_request().await;
            agent.respond_error(&join, 401, "token expired").await;
            agent
        }
    );
    let err = outcome.unwrap_err();
    assert_eq!(err.protocol_code(), Some(401));
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(connection.transport_id(), None);

    let (retry, _agent) = tokio::join!(
        connection.reconnect(None, || async { Ok(credentials("t-2")) }),
        async {
            let mut agent = next_agent(&mut agents).await;
            agent.accept_join("rt-3").await;
            agent
        }
    );
    assert_eq!(retry.expect("retry").reconnect_token(), Some("rt-3"));
    assert!(connection.is_connected());
    connection.dispose();
}

#[tokio::test]
async fn test_start_transport_failure_reverts_to_disconnected() {
    let Harness {
        connection,
        mut agent,
        connector,
        ..
    } = connect(ConnectionConfig::default()).await;
    agent.close().await;
    eventually(|| connection.state() == ConnectionState::Disconnected).await;

    let err = connection
        .reconnect(None, || async { Err(Error::connection("session service down")) })
        .await
        .unwrap_err();
    assert!(err.is_connection_error());
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    assert_eq!(connector.connects(), 1);
    connection.dispose();
}

#[tokio::test]
async fn test_in_flight_request_survives_reconnect_with_fresh_ids() {
    let Harness {
        connection,
        mut agent,
        mut agents,
        ..
    } = connect(ConnectionConfig::default()).await;

    let stranded = connection
        .start_request(
            "fs/readDir",
            json!({"path": "/"}),
            RequestOptions::new().with_timeout(Duration::from_millis(500)),
        )
        .expect("start");
    let _ = agent.next_request().await;

    agent.close().await;
    eventually(|| connection.state() == ConnectionState::Disconnected).await;
    assert_eq!(connection.pending_count(), 1);

    let (outcome, mut agent) = tokio::join!(
        connection.reconnect(Some("rt-1".into()), || async { Ok(credentials("t-1")) }),
        async {
            let mut agent = next_agent(&mut agents).await;
            agent.accept_join("rt-2").await;
            agent
        }
    );
    outcome.expect("reconnect");

    let fresh = connection
        .start_request("fs/readDir", json!({"path": "/"}), RequestOptions::default())
        .expect("fresh");
    assert!(fresh.id() > stranded.id());

    let request = agent.next_request().await;
    assert_eq!(request.id, fresh.id());
    agent.respond(&request, json!({"entries": []})).await;
    fresh.result().await.expect("fresh result");

    // Nobody answers the request sent on the lost transport.
    assert!(stranded.result().await.unwrap_err().is_timeout());
    connection.dispose();
}

#[tokio::test]
async fn test_replayed_response_on_new_transport_settles_once() {
    let Harness {
        connection,
        mut agent,
        mut agents,
        ..
    } = connect(ConnectionConfig::default()).await;

    let stranded = connection
        .start_request(
            "fs/readDir",
            json!({"path": "/"}),
            RequestOptions::new().with_timeout(Duration::from_secs(3)),
        )
        .expect("start");
    let stranded_id = stranded.id();
    let _ = agent.next_request().await;

    agent.close().await;
    eventually(|| connection.state() == ConnectionState::Disconnected).await;

    let (outcome, mut agent) = tokio::join!(
        connection.reconnect(Some("rt-1".into()), || async { Ok(credentials("t-1")) }),
        async {
            let mut agent = next_agent(&mut agents).await;
            agent.accept_join("rt-2").await;
            agent
        }
    );
    outcome.expect("reconnect");

    // The agent replays the answer on the new transport before the deadline.
    agent
        .respond_to_id(stranded_id, "fs/readDir", json!({"entries": ["a"]}))
        .await;
    let value = timeout(WAIT, stranded.result())
        .await
        .expect("settled")
        .expect("replayed result");
    assert_eq!(value["entries"], json!(["a"]));
    assert_eq!(connection.pending_count(), 0);

    // A second replay has nothing left to settle.
    agent
        .respond_to_id(stranded_id, "fs/readDir", json!({"entries": ["b"]}))
        .await;
    let (fresh, _) = tokio::join!(connection.request("port/list", json!({})), async {
        let request = agent.next_request().await;
        agent.respond(&request, json!({"ports": [3000]})).await;
    });
    assert_eq!(fresh.expect("fresh")["ports"], json!([3000]));
    assert!(connection.is_connected());
    assert_eq!(connection.pending_count(), 0);
    connection.dispose();
}

#[tokio::test]
async fn test_replayed_response_after_timeout_is_dropped() {
    let Harness {
        connection,
        mut agent,
        mut agents,
        ..
    } = connect(ConnectionConfig::default()).await;

    let stranded = connection
        .start_request(
            "fs/readDir",
            json!({"path": "/"}),
            RequestOptions::new().with_timeout(Duration::from_millis(150)),
        )
        .expect("start");
    let stranded_id = stranded.id();
    let _ = agent.next_request().await;

    agent.close().await;
    eventually(|| connection.state() == ConnectionState::Disconnected).await;

    let (outcome, mut agent) = tokio::join!(
        connection.reconnect(Some("rt-1".into()), || async { Ok(credentials("t-1")) }),
        async {
            let mut agent = next_agent(&mut agents).await;
            agent.accept_join("rt-2").await;
            agent
        }
    );
    outcome.expect("reconnect");
    assert!(stranded.result().await.unwrap_err().is_timeout());

    let fresh = connection
        .start_request("fs/readDir", json!({"path": "/tmp"}), RequestOptions::default())
        .expect("fresh");
    let request = agent.next_request().await;
    assert_ne!(request.id, stranded_id);

    agent
        .respond_to_id(stranded_id, "fs/readDir", json!({"entries": ["stale"]}))
        .await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(connection.pending_count(), 1);
    assert!(connection.is_connected());

    agent.respond(&request, json!({"entries": ["tmp"]})).await;
    let value = fresh.result().await.expect("fresh result");
    assert_eq!(value["entries"], json!(["tmp"]));
    assert_eq!(connection.pending_count(), 0);
    connection.dispose();
}

#[tokio::test]
async fn test_disconnect_during_reconnect_is_rejected() {
    let Harness {
        connection,
        mut agent,
        mut agents,
        ..
    } = connect(ConnectionConfig::default()).await;
    agent.close().await;
    eventually(|| connection.state() == ConnectionState::Disconnected).await;

    let (gate_tx, gate_rx) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate_rx)));
    let reconnecting = tokio::spawn({
        let connection = connection.clone();
        async move {
            connection
                .reconnect(Some("rt-1".into()), move || async move {
                    let rx = gate.lock().take();
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Ok(credentials("t-1"))
                })
                .await
        }
    });
    eventually(|| connection.state() == ConnectionState::Connecting).await;

    let err = connection.disconnect().await.unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            state: ConnectionState::Connecting,
            ..
        }
    ));
    assert_eq!(connection.state(), ConnectionState::Connecting);

    let _ = gate_tx.send(());
    let mut agent = next_agent(&mut agents).await;
    agent.accept_join("rt-2").await;
    assert!(reconnecting.await.expect("join").expect("reconnect").is_reconnected());
    assert_eq!(connection.state(), ConnectionState::Connected);

    connection.disconnect().await.expect("disconnect");
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    connection.dispose();
}

#[tokio::test]
async fn test_reject_pending_on_disconnect() {
    let Harness {
        connection,
        mut agent,
        ..
    } = connect(ConnectionConfig::new().with_reject_pending_on_disconnect(true)).await;

    let handle = connection
        .start_request("shell/list", json!({}), RequestOptions::default())
        .expect("start");
    let _ = agent.next_request().await;

    agent.close().await;

    let err = timeout(WAIT, handle.result())
        .await
        .expect("in time")
        .unwrap_err();
    assert!(matches!(err, Error::ConnectionClosed));
    assert_eq!(connection.pending_count(), 0);
    connection.dispose();
}

#[tokio::test]
async fn test_graceful_disconnect_waits_for_in_flight() {
    let Harness {
        connection,
        mut agent,
        ..
    } = connect(ConnectionConfig::default()).await;

    let handle = connection
        .start_request("task/run", json!({"taskId": "build"}), RequestOptions::default())
        .expect("start");
    let request = agent.next_request().await;

    let disconnect = tokio::spawn({
        let connection = connection.clone();
        async move { connection.disconnect().await }
    });
    sleep(Duration::from_millis(50)).await;
    assert!(!disconnect.is_finished());
    assert!(connection.is_connected());

    agent.respond(&request, json!({})).await;
    handle.result().await.expect("result");
    timeout(WAIT, disconnect)
        .await
        .expect("in time")
        .expect("join")
        .expect("disconnect");
    assert_eq!(connection.state(), ConnectionState::Disconnected);
    connection.dispose();
}

// ============================================================================
// Hibernation
// ============================================================================

#[tokio::test]
async fn test_hibernate_then_resume() {
    let Harness {
        connection,
        mut agent,
        mut agents,
        ..
    } = connect(ConnectionConfig::default()).await;
    let (tx, mut rx) = unbounded_channel();
    let _sub = connection.on_state_change(move |state| {
        let _ = tx.send(*state);
    });

    agent.notify("system/hibernate", json!({"reason": "idle"})).await;
    assert_eq!(
        timeout(WAIT, rx.recv()).await.expect("in time"),
        Some(ConnectionState::Hibernated)
    );
    assert_eq!(connection.transport_id(), None);

    let (outcome, _agent) = tokio::join!(
        connection.reconnect(Some("rt-1".into()), || async { Ok(credentials("t-1")) }),
        async {
            let mut agent = next_agent(&mut agents).await;
            agent.accept_join("rt-2").await;
            agent
        }
    );
    assert!(outcome.expect("resume").is_reconnected());
    assert_eq!(rx.recv().await, Some(ConnectionState::Connecting));
    assert_eq!(rx.recv().await, Some(ConnectionState::Connected));
    connection.dispose();
}

// ============================================================================
// Heartbeat
// ============================================================================

fn fast_heartbeat() -> ConnectionConfig {
    ConnectionConfig::new()
        .with_heartbeat_grace(Duration::from_millis(100))
        .with_transport(
            TransportOptions::new()
                .with_ping_interval(Duration::from_millis(20))
                .with_pong_detection_timeout(Duration::from_millis(60)),
        )
}

#[tokio::test]
async fn test_silent_idle_agent_disconnected_after_grace() {
    // The agent never reads again, so pings go unanswered.
    let Harness {
        connection,
        agent: _agent,
        ..
    } = connect(fast_heartbeat()).await;

    eventually(|| connection.state() == ConnectionState::Disconnected).await;
    connection.dispose();
}

#[tokio::test]
async fn test_in_flight_request_keeps_silent_transport() {
    let Harness {
        connection,
        mut agent,
        ..
    } = connect(fast_heartbeat()).await;

    let handle = connection
        .start_request("setup/get", json!({}), RequestOptions::default())
        .expect("start");

    sleep(Duration::from_millis(400)).await;
    assert!(connection.is_connected());

    let request = agent.next_request().await;
    agent.respond(&request, json!({"state": "complete"})).await;
    assert_eq!(handle.result().await.expect("result")["state"], "complete");
    connection.dispose();
}

#[tokio::test]
async fn test_silent_agent_disconnected_once_busy_request_times_out() {
    let Harness {
        connection,
        agent: _agent,
        ..
    } = connect(fast_heartbeat()).await;

    // Still pending when the first grace check runs.
    let handle = connection
        .start_request(
            "fs/stat",
            json!({"path": "/"}),
            RequestOptions::new().with_timeout(Duration::from_millis(300)),
        )
        .expect("start");
    assert!(handle.result().await.unwrap_err().is_timeout());
    assert_eq!(connection.pending_count(), 0);

    eventually(|| connection.state() == ConnectionState::Disconnected).await;
    assert_eq!(connection.transport_id(), None);
    connection.dispose();
}

#[tokio::test]
async fn test_request_during_grace_window_keeps_transport() {
    let config = fast_heartbeat().with_heartbeat_grace(Duration::from_millis(300));
    let Harness {
        connection,
        mut agent,
        ..
    } = connect(config).await;

    // Silence is reported after ~60ms; the grace check fires ~300ms later.
    sleep(Duration::from_millis(120)).await;
    let handle = connection
        .start_request("port/list", json!({}), RequestOptions::default())
        .expect("start");

    sleep(Duration::from_millis(400)).await;
    assert!(connection.is_connected());

    let request = agent.next_request().await;
    agent.respond(&request, json!({"ports": []})).await;
    handle.result().await.expect("result");
    connection.dispose();
}

// ============================================================================
// Disposal
// ============================================================================

#[tokio::test]
async fn test_dispose_is_terminal() {
    let Harness {
        connection,
        agent: _agent,
        ..
    } = connect(ConnectionConfig::default()).await;

    let handle = connection
        .start_request("fs/stat", json!({}), RequestOptions::default())
        .expect("start");
    connection.dispose();
    connection.dispose();

    assert!(connection.is_disposed());
    assert!(handle.result().await.unwrap_err().is_disposed());
    assert!(
        connection
            .request("fs/stat", json!({}))
            .await
            .unwrap_err()
            .is_disposed()
    );
    assert!(
        connection
            .reconnect(None, || async { Ok(credentials("t")) })
            .await
            .unwrap_err()
            .is_disposed()
    );

    let late = connection.on_notification("shell/out", |_| {});
    assert!(!late.is_active());
}
