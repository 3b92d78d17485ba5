//! In-memory sandbox agent for integration tests.
//!
//! [`MemoryConnector`] builds transports over `tokio::io::duplex` pipes and
//! hands the server half of each one to the test as a [`MockAgent`].

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{DuplexStream, duplex};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::Role;
use url::Url;

use sandbox_agent_client::{
    Connection, ConnectionConfig, Connector, Error, JoinResult, OutboundRequest, RequestId, Result,
    TransportCredentials, TransportOptions, TransportSocket,
};

/// Upper bound for any single wait in tests.
pub const WAIT: Duration = Duration::from_secs(5);

// ============================================================================
// MockAgent
// ============================================================================

/// Server side of one in-memory transport.
pub struct MockAgent {
    /// URL the client connected with, including query parameters.
    pub url: Url,
    stream: WebSocketStream<DuplexStream>,
}

impl MockAgent {
    /// Returns a query parameter of the connect URL.
    pub fn query(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    /// Reads the next request frame, skipping control frames.
    pub async fn next_request(&mut self) -> OutboundRequest {
        timeout(WAIT, async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Binary(bytes))) => {
                        return serde_json::from_slice(&bytes).expect("request frame");
                    }
                    Some(Ok(_)) => continue,
                    other => panic!("agent stream ended: {other:?}"),
                }
            }
        })
        .await
        .expect("request within deadline")
    }

    /// Sends a raw binary frame.
    pub async fn send_raw(&mut self, bytes: Vec<u8>) {
        let _ = self.stream.send(Message::Binary(bytes.into())).await;
    }

    /// Sends a JSON frame.
    pub async fn send_json(&mut self, frame: Value) {
        self.send_raw(serde_json::to_vec(&frame).expect("encode")).await;
    }

    /// Answers `request` with `result`.
    pub async fn respond(&mut self, request: &OutboundRequest, result: Value) {
        self.send_json(json!({"id": request.id, "method": request.method, "result": result}))
            .await;
    }

    /// Answers `id` with `result`, whatever was asked.
    pub async fn respond_to_id(&mut self, id: RequestId, method: &str, result: Value) {
        self.send_json(json!({"id": id, "method": method, "result": result}))
            .await;
    }

    /// Answers `request` with an error.
    pub async fn respond_error(&mut self, request: &OutboundRequest, code: i64, message: &str) {
        self.send_json(json!({
            "id": request.id,
            "method": request.method,
            "error": {"code": code, "message": message}
        }))
        .await;
    }

    /// Pushes a notification.
    pub async fn notify(&mut self, method: &str, params: Value) {
        self.send_json(json!({"method": method, "params": params})).await;
    }

    /// Reads the join request and accepts it, issuing `reconnect_token`.
    pub async fn accept_join(&mut self, reconnect_token: &str) -> OutboundRequest {
        let join = self.next_request().await;
        assert_eq!(join.method, "client/join");
        self.respond(&join, json!({"reconnectToken": reconnect_token})).await;
        join
    }

    /// Closes the transport from the agent side.
    pub async fn close(&mut self) {
        let _ = self.stream.close(None).await;
    }
}

// ============================================================================
// MemoryConnector
// ============================================================================

/// Connector producing in-memory transports.
#[derive(Clone)]
pub struct MemoryConnector {
    agents: UnboundedSender<MockAgent>,
    connects: Arc<AtomicUsize>,
    refuse: Arc<AtomicBool>,
}

impl MemoryConnector {
    /// Creates a connector and the stream of agents it produces.
    pub fn new() -> (Self, UnboundedReceiver<MockAgent>) {
        let (agents, rx) = unbounded_channel();
        let connector = Self {
            agents,
            connects: Arc::new(AtomicUsize::new(0)),
            refuse: Arc::new(AtomicBool::new(false)),
        };
        (connector, rx)
    }

    /// Number of transports opened so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Makes subsequent connects fail.
    pub fn set_refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url, options: &TransportOptions) -> Result<TransportSocket> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::connection("connection refused"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);

        let (client, server) = duplex(256 * 1024);
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;

        let _ = self.agents.send(MockAgent {
            url: url.clone(),
            stream: server,
        });
        Ok(TransportSocket::from_stream(client, url.as_str(), options))
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Credentials pointing at the in-memory agent.
pub fn credentials(token: &str) -> TransportCredentials {
    TransportCredentials::new("ws://agent.test/ws", token)
}

/// Receives the next agent, failing the test if none arrives.
pub async fn next_agent(agents: &mut UnboundedReceiver<MockAgent>) -> MockAgent {
    timeout(WAIT, agents.recv())
        .await
        .expect("agent within deadline")
        .expect("connector alive")
}

/// A joined connection plus its agent.
pub struct Harness {
    pub connection: Connection,
    pub agent: MockAgent,
    pub agents: UnboundedReceiver<MockAgent>,
    pub connector: MemoryConnector,
    pub joined: JoinResult,
}

/// Connects through a [`MemoryConnector`], accepting the join with `rt-1`.
pub async fn connect(config: ConnectionConfig) -> Harness {
    let (connector, mut agents) = MemoryConnector::new();
    let credentials = credentials("t-0");

    let (connected, agent) = tokio::join!(
        Connection::connect(Arc::new(connector.clone()), &credentials, None, config),
        async {
            let mut agent = next_agent(&mut agents).await;
            agent.accept_join("rt-1").await;
            agent
        }
    );
    let (connection, joined) = connected.expect("connect");

    Harness {
        connection,
        agent,
        agents,
        connector,
        joined,
    }
}

/// Waits until `condition` holds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition within deadline");
}

/// Installs a test subscriber once; honors `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
