//! One physical WebSocket connection and its liveness detection.
//!
//! # Tasks
//!
//! Each socket runs three tokio tasks:
//!
//! - **reader**: stamps activity, then queues binary frames for ordered
//!   delivery; text frames are ignored
//! - **writer**: serializes outgoing frames onto the sink
//! - **heartbeat**: sends keepalive pings and reports silence longer than
//!   the pong detection timeout
//!
//! # Disconnect
//!
//! `on_disconnected` fires exactly once per socket: remote close, read or
//! write error, send while closing/closed, ping timeout, or explicit
//! [`TransportSocket::dispose`]. After that the socket emits nothing.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval, sleep};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, error, trace, warn};

use crate::dispose::DisposeStack;
use crate::error::{Error, Result};
use crate::event::{Emitter, Subscription};
use crate::identifiers::TransportId;

use super::options::TransportOptions;
use super::queue::OrderedQueue;

// ============================================================================
// ReadyState
// ============================================================================

/// Socket lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting = 0,
    /// Open and usable.
    Open = 1,
    /// Disconnect in progress.
    Closing = 2,
    /// Fully closed.
    Closed = 3,
}

impl ReadyState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Connecting => "CONNECTING",
            Self::Open => "OPEN",
            Self::Closing => "CLOSING",
            Self::Closed => "CLOSED",
        })
    }
}

// ============================================================================
// DisconnectReason
// ============================================================================

/// Why a socket disconnected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the connection or the stream ended.
    RemoteClose {
        /// Close code, if a close frame carried one.
        code: Option<u16>,
        /// Close reason text.
        reason: String,
    },
    /// A read or write failed.
    Error(String),
    /// A send was attempted while closing or closed.
    NotOpen,
    /// No activity followed an explicit ping.
    PingTimeout,
    /// The owner disposed the socket.
    Disposed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteClose { code: Some(code), reason } => {
                write!(f, "remote close ({code}): {reason}")
            }
            Self::RemoteClose { code: None, reason } => write!(f, "remote close: {reason}"),
            Self::Error(message) => write!(f, "error: {message}"),
            Self::NotOpen => f.write_str("not open"),
            Self::PingTimeout => f.write_str("ping timeout"),
            Self::Disposed => f.write_str("disposed"),
        }
    }
}

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the writer task.
enum SocketCommand {
    /// Write a frame.
    Send(Message),
    /// Send a close frame and stop.
    Close,
}

// ============================================================================
// SocketInner
// ============================================================================

/// State shared between the handle and the socket tasks.
struct SocketInner {
    id: TransportId,
    url: String,
    ready_state: AtomicU8,
    /// Set before `on_disconnected` fires; gates every later emission.
    disposed: AtomicBool,
    last_activity: Mutex<Instant>,
    pong_detection_timeout_ms: AtomicU64,
    /// Latched when a missing heartbeat was reported; cleared by activity.
    heartbeat_missed: AtomicBool,
    command_tx: mpsc::UnboundedSender<SocketCommand>,
    ping_task: Mutex<Option<JoinHandle<()>>>,
    on_message: Emitter<Vec<u8>>,
    on_disconnected: Emitter<DisconnectReason>,
    on_missing_heartbeat: Emitter<Duration>,
    cleanup: DisposeStack,
}

impl SocketInner {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready_state.load(Ordering::SeqCst))
    }

    fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Records inbound activity.
    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
        self.heartbeat_missed.store(false, Ordering::SeqCst);
    }

    fn pong_detection_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_detection_timeout_ms.load(Ordering::SeqCst))
    }

    /// Reports a missing heartbeat once per silent period.
    fn check_heartbeat(&self) {
        if self.is_disposed() {
            return;
        }

        let silence = self.last_activity.lock().elapsed();
        if silence > self.pong_detection_timeout()
            && !self.heartbeat_missed.swap(true, Ordering::SeqCst)
        {
            debug!(transport_id = %self.id, silence_ms = silence.as_millis() as u64, "Missing heartbeat");
            self.on_missing_heartbeat.emit(&silence);
        }
    }

    /// Runs the single disconnect for this socket.
    fn fire_disconnect(&self, reason: DisconnectReason) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.ready_state
            .store(ReadyState::Closing as u8, Ordering::SeqCst);
        debug!(transport_id = %self.id, %reason, "Transport disconnected");

        self.on_disconnected.emit(&reason);
        self.cleanup.dispose();

        self.ready_state
            .store(ReadyState::Closed as u8, Ordering::SeqCst);
    }
}

// ============================================================================
// TransportSocket
// ============================================================================

/// Handle to one open WebSocket connection.
///
/// Clones share the same socket. Dropping handles does not close the
/// socket; call [`dispose`](Self::dispose).
#[derive(Clone)]
pub struct TransportSocket {
    inner: Arc<SocketInner>,
}

impl fmt::Debug for TransportSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSocket")
            .field("id", &self.inner.id)
            .field("url", &self.inner.url)
            .field("ready_state", &self.inner.ready_state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TransportSocket - Constructor
// ============================================================================

impl TransportSocket {
    /// Wraps an already open WebSocket stream.
    ///
    /// Spawns the reader, writer, and heartbeat tasks. Must be called from
    /// within a tokio runtime.
    pub fn from_stream<S>(stream: S, url: impl Into<String>, options: &TransportOptions) -> Self
    where
        S: Stream<Item = std::result::Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Send
            + Unpin
            + 'static,
    {
        let (ws_write, ws_read) = stream.split();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let inner = Arc::new(SocketInner {
            id: TransportId::next(),
            url: url.into(),
            ready_state: AtomicU8::new(ReadyState::Open as u8),
            disposed: AtomicBool::new(false),
            last_activity: Mutex::new(Instant::now()),
            pong_detection_timeout_ms: AtomicU64::new(
                options.pong_detection_timeout.as_millis() as u64,
            ),
            heartbeat_missed: AtomicBool::new(false),
            command_tx,
            ping_task: Mutex::new(None),
            on_message: Emitter::new(),
            on_disconnected: Emitter::new(),
            on_missing_heartbeat: Emitter::new(),
            cleanup: DisposeStack::new(),
        });

        let weak = Arc::downgrade(&inner);
        let queue = OrderedQueue::new({
            let weak = weak.clone();
            move |bytes: Vec<u8>| {
                if let Some(inner) = weak.upgrade()
                    && !inner.is_disposed()
                {
                    inner.on_message.emit(&bytes);
                }
            }
        });

        let reader = tokio::spawn(run_reader(weak.clone(), ws_read, queue));
        let heartbeat = tokio::spawn(run_heartbeat(weak.clone(), options.ping_interval));
        tokio::spawn(run_writer(weak, ws_write, command_rx));

        // Registered first so it runs last, after listeners are cleared.
        {
            let tx = inner.command_tx.clone();
            inner.cleanup.push(move || {
                let _ = tx.send(SocketCommand::Close);
            });
        }
        inner.cleanup.push(move || reader.abort());
        inner.cleanup.push(move || heartbeat.abort());
        {
            let weak = Arc::downgrade(&inner);
            inner.cleanup.push(move || {
                if let Some(inner) = weak.upgrade() {
                    if let Some(task) = inner.ping_task.lock().take() {
                        task.abort();
                    }
                    inner.on_message.close();
                    inner.on_disconnected.close();
                    inner.on_missing_heartbeat.close();
                }
            });
        }

        debug!(transport_id = %inner.id, url = %inner.url, "Transport socket open");

        Self { inner }
    }
}

// ============================================================================
// TransportSocket - Accessors
// ============================================================================

impl TransportSocket {
    /// Returns the transport id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> TransportId {
        self.inner.id
    }

    /// Returns the URL this socket was opened against.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Returns the current ready state.
    #[inline]
    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.inner.ready_state()
    }

    /// Returns when the last inbound frame arrived.
    #[inline]
    #[must_use]
    pub fn last_activity(&self) -> Instant {
        *self.inner.last_activity.lock()
    }

    /// Returns `true` once disconnected or disposed.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.is_disposed()
    }
}

// ============================================================================
// TransportSocket - Operations
// ============================================================================

impl TransportSocket {
    /// Queues a binary frame for sending.
    ///
    /// Acceptance does not imply delivery; write failures surface through
    /// `on_disconnected`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOpen`] if the socket is closing or closed, and
    /// raises the disconnect with [`DisconnectReason::NotOpen`].
    pub fn send(&self, bytes: Vec<u8>) -> Result<()> {
        trace!(transport_id = %self.inner.id, len = bytes.len(), "Frame queued");
        self.send_message(Message::Binary(bytes.into()))
    }

    /// Probes liveness; disconnects unless activity follows within `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotOpen`] if the socket is closing or closed.
    pub fn ping(&self, timeout: Duration) -> Result<()> {
        let sent_at = Instant::now();
        self.send_message(Message::Ping(Vec::new().into()))?;

        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            sleep(timeout).await;
            if let Some(inner) = weak.upgrade()
                && *inner.last_activity.lock() <= sent_at
            {
                warn!(transport_id = %inner.id, timeout_ms = timeout.as_millis() as u64, "Ping timed out");
                inner.fire_disconnect(DisconnectReason::PingTimeout);
            }
        });

        if let Some(previous) = self.inner.ping_task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }

    /// Adjusts the passive heartbeat silence window.
    pub fn set_pong_detection_timeout(&self, timeout: Duration) {
        self.inner
            .pong_detection_timeout_ms
            .store(timeout.as_millis() as u64, Ordering::SeqCst);
    }

    /// Closes the socket. Idempotent.
    ///
    /// Fires `on_disconnected` with [`DisconnectReason::Disposed`] if it has
    /// not fired yet.
    pub fn dispose(&self) {
        self.inner.fire_disconnect(DisconnectReason::Disposed);
    }

    /// Alias for [`dispose`](Self::dispose).
    #[inline]
    pub fn close(&self) {
        self.dispose();
    }

    fn send_message(&self, message: Message) -> Result<()> {
        let state = self.inner.ready_state();
        if matches!(state, ReadyState::Closing | ReadyState::Closed) {
            self.inner.fire_disconnect(DisconnectReason::NotOpen);
            return Err(Error::not_open(state));
        }

        self.inner
            .command_tx
            .send(SocketCommand::Send(message))
            .map_err(|_| {
                self.inner.fire_disconnect(DisconnectReason::NotOpen);
                Error::not_open(ReadyState::Closed)
            })
    }
}

// ============================================================================
// TransportSocket - Events
// ============================================================================

impl TransportSocket {
    /// Subscribes to inbound binary frames, in arrival order.
    pub fn on_message<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Vec<u8>) + Send + Sync + 'static,
    {
        self.inner.on_message.subscribe(listener)
    }

    /// Subscribes to the single disconnect event.
    pub fn on_disconnected<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&DisconnectReason) + Send + Sync + 'static,
    {
        self.inner.on_disconnected.subscribe(listener)
    }

    /// Subscribes to missing-heartbeat reports, carrying the silence length.
    pub fn on_missing_heartbeat<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Duration) + Send + Sync + 'static,
    {
        self.inner.on_missing_heartbeat.subscribe(listener)
    }
}

// ============================================================================
// Socket Tasks
// ============================================================================

/// Reads frames until the stream ends or the socket is disposed.
async fn run_reader<R>(weak: Weak<SocketInner>, mut ws_read: R, queue: OrderedQueue<Vec<u8>>)
where
    R: Stream<Item = std::result::Result<Message, WsError>> + Unpin,
{
    while let Some(message) = ws_read.next().await {
        let Some(inner) = weak.upgrade() else {
            return;
        };

        match message {
            Ok(message) => {
                inner.touch();

                match message {
                    Message::Binary(bytes) => {
                        trace!(transport_id = %inner.id, len = bytes.len(), "Frame received");
                        queue.push_ready(bytes.to_vec());
                    }

                    Message::Text(_) => {
                        warn!(transport_id = %inner.id, "Ignoring text frame");
                    }

                    Message::Close(frame) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                            .unwrap_or((None, String::new()));
                        inner.fire_disconnect(DisconnectReason::RemoteClose { code, reason });
                        return;
                    }

                    // Ping, Pong, raw frames: activity only
                    _ => {}
                }
            }

            Err(e) => {
                error!(transport_id = %inner.id, error = %e, "WebSocket error");
                inner.fire_disconnect(DisconnectReason::Error(e.to_string()));
                return;
            }
        }
    }

    if let Some(inner) = weak.upgrade() {
        inner.fire_disconnect(DisconnectReason::RemoteClose {
            code: None,
            reason: "stream ended".to_string(),
        });
    }
}

/// Writes queued frames until closed.
async fn run_writer<W>(
    weak: Weak<SocketInner>,
    mut ws_write: W,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
) where
    W: Sink<Message, Error = WsError> + Unpin,
{
    while let Some(command) = command_rx.recv().await {
        match command {
            SocketCommand::Send(message) => {
                if let Err(e) = ws_write.send(message).await {
                    warn!(error = %e, "Failed to write frame");
                    if let Some(inner) = weak.upgrade() {
                        inner.fire_disconnect(DisconnectReason::Error(e.to_string()));
                    }
                    break;
                }
            }

            SocketCommand::Close => {
                let _ = ws_write.close().await;
                break;
            }
        }
    }

    trace!("Writer task terminated");
}

/// Sends keepalive pings and reports heartbeat silence.
async fn run_heartbeat(weak: Weak<SocketInner>, ping_interval: Duration) {
    let mut ticker = interval(ping_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(inner) = weak.upgrade() else {
            return;
        };
        if inner.is_disposed() {
            return;
        }

        let _ = inner
            .command_tx
            .send(SocketCommand::Send(Message::Ping(Vec::new().into())));
        inner.check_heartbeat();
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;

    use tokio::io::{DuplexStream, duplex};
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::time::timeout;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn socket_pair(options: &TransportOptions) -> (TransportSocket, WebSocketStream<DuplexStream>) {
        let (client, server) = duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
        (TransportSocket::from_stream(client, "ws://test", options), server)
    }

    #[tokio::test]
    async fn test_binary_frames_delivered_in_order() {
        let (socket, mut server) = socket_pair(&TransportOptions::default()).await;
        let (tx, mut rx) = unbounded_channel();
        let _sub = socket.on_message(move |bytes| {
            let _ = tx.send(bytes.clone());
        });

        server.send(Message::Binary(vec![1].into())).await.expect("send");
        server.send(Message::Text("ignored".into())).await.expect("send");
        server.send(Message::Binary(vec![2].into())).await.expect("send");

        assert_eq!(rx.recv().await, Some(vec![1]));
        assert_eq!(rx.recv().await, Some(vec![2]));
        socket.dispose();
    }

    #[tokio::test]
    async fn test_send_reaches_peer() {
        let (socket, mut server) = socket_pair(&TransportOptions::default()).await;
        socket.send(b"hello".to_vec()).expect("send");

        let message = server.next().await.expect("frame").expect("ok");
        assert_eq!(message, Message::Binary(b"hello".to_vec().into()));
        socket.dispose();
    }

    #[tokio::test]
    async fn test_disconnect_fires_once() {
        let (socket, server) = socket_pair(&TransportOptions::default()).await;
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let _sub = socket.on_disconnected(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        drop(server);
        timeout(Duration::from_secs(2), async {
            while !socket.is_disposed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("disconnect observed");

        socket.dispose();
        let _ = socket.send(vec![0]);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(socket.ready_state(), ReadyState::Closed);
    }

    #[tokio::test]
    async fn test_send_after_dispose_fails() {
        let (socket, _server) = socket_pair(&TransportOptions::default()).await;
        socket.dispose();
        socket.dispose();

        let err = socket.send(vec![1]).unwrap_err();
        assert!(matches!(err, Error::NotOpen { .. }));
    }

    #[tokio::test]
    async fn test_missing_heartbeat_reported_when_peer_silent() {
        let options = TransportOptions::new()
            .with_ping_interval(Duration::from_millis(20))
            .with_pong_detection_timeout(Duration::from_millis(60));
        // The server half is never polled, so pings are never answered.
        let (socket, _server) = socket_pair(&options).await;

        let (tx, mut rx) = unbounded_channel();
        let _sub = socket.on_missing_heartbeat(move |silence| {
            let _ = tx.send(*silence);
        });

        let silence = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("heartbeat reported")
            .expect("value");
        assert!(silence > Duration::from_millis(60));
        socket.dispose();
    }

    #[tokio::test]
    async fn test_ping_timeout_disconnects() {
        let (socket, _server) = socket_pair(&TransportOptions::default()).await;
        let (tx, mut rx) = unbounded_channel();
        let _sub = socket.on_disconnected(move |reason| {
            let _ = tx.send(reason.clone());
        });

        socket.ping(Duration::from_millis(30)).expect("ping");

        let reason = timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("disconnected")
            .expect("reason");
        assert_eq!(reason, DisconnectReason::PingTimeout);
    }

    #[test]
    fn test_ready_state_display() {
        assert_eq!(ReadyState::Open.to_string(), "OPEN");
        assert_eq!(DisconnectReason::NotOpen.to_string(), "not open");
    }
}
