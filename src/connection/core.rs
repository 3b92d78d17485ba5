//! Connection core: request multiplexing over a replaceable transport.
//!
//! A [`Connection`] owns at most one live [`TransportSocket`] at a time. The
//! pending request table and notification dispatcher outlive any single
//! transport, so request ids are allocated from one counter for the life of
//! the connection and never reused.
//!
//! Transport callbacks carry the id of the transport they were registered
//! on; events from a transport that is no longer current are ignored.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::event::{Emitter, Subscription};
use crate::identifiers::{RequestId, TransportId};
use crate::protocol::{
    Codec, Envelope, HIBERNATE_METHOD, JOIN_METHOD, JoinParams, JoinResult, JsonCodec, OutboundRequest,
};
use crate::transport::{Connector, DisconnectReason, TransportCredentials, TransportSocket, WebSocketConnector};

use super::config::{ConnectionConfig, RequestOptions};
use super::notifications::NotificationDispatcher;
use super::pending::{PendingHandle, PendingRequests};
use super::state::{ConnectionEvent, ConnectionState, Effect, transition};

// ============================================================================
// RequestFailure
// ============================================================================

/// A request whose frame could not be handed to the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFailure {
    /// The request that failed.
    pub request: OutboundRequest,
    /// Rendered send error.
    pub error: String,
}

// ============================================================================
// ReconnectOutcome
// ============================================================================

/// Result of [`Connection::reconnect`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectOutcome {
    /// The connection was not DISCONNECTED or HIBERNATED; nothing happened.
    Skipped {
        /// State observed at the call.
        state: ConnectionState,
    },
    /// A new transport joined.
    Reconnected(JoinResult),
}

impl ReconnectOutcome {
    /// Returns `true` if a new transport joined.
    #[inline]
    #[must_use]
    pub fn is_reconnected(&self) -> bool {
        matches!(self, Self::Reconnected(_))
    }

    /// Returns the reconnect token issued by the join, if any.
    #[must_use]
    pub fn reconnect_token(&self) -> Option<&str> {
        match self {
            Self::Reconnected(joined) => joined.reconnect_token.as_deref(),
            Self::Skipped { .. } => None,
        }
    }

    /// Returns the join result, or [`Error::InvalidState`] if skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] for [`ReconnectOutcome::Skipped`].
    pub fn into_joined(self) -> Result<JoinResult> {
        match self {
            Self::Reconnected(joined) => Ok(joined),
            Self::Skipped { state } => Err(Error::invalid_state("reconnect", state)),
        }
    }
}

// ============================================================================
// AttachedTransport
// ============================================================================

/// The live transport plus the connection's listeners on it.
struct AttachedTransport {
    socket: TransportSocket,
    subscriptions: Vec<Subscription>,
}

impl AttachedTransport {
    fn release(self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
        self.socket.dispose();
        debug!(transport_id = %self.socket.id(), "Transport released");
    }
}

// ============================================================================
// ConnectionInner
// ============================================================================

struct ConnectionInner {
    config: ConnectionConfig,
    codec: Arc<dyn Codec>,
    connector: Arc<dyn Connector>,

    state: Mutex<ConnectionState>,
    disposed: AtomicBool,
    next_id: AtomicU64,

    transport: Mutex<Option<AttachedTransport>>,
    heartbeat_check: Mutex<Option<JoinHandle<()>>>,

    pending: PendingRequests,
    notifications: NotificationDispatcher,

    on_state_change: Emitter<ConnectionState>,
    on_message: Emitter<Envelope>,
    on_request_error: Emitter<RequestFailure>,
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat_check.get_mut().take() {
            handle.abort();
        }
        if let Some(attached) = self.transport.get_mut().take() {
            attached.release();
        }
    }
}

// ============================================================================
// Connection
// ============================================================================

/// Multiplexed request/response and notification channel to the agent.
///
/// Cheap to clone; all clones share one connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("transport_id", &self.transport_id())
            .field("pending", &self.pending_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ============================================================================
// Connection - Construction
// ============================================================================

impl Connection {
    /// Wraps an already joined transport. The connection starts CONNECTED.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn new(transport: TransportSocket, config: ConnectionConfig) -> Result<Self> {
        Self::from_parts(transport, config, Arc::new(JsonCodec), Arc::new(WebSocketConnector))
    }

    /// Like [`new`](Self::new) with an explicit codec and connector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` is invalid.
    pub fn from_parts(
        transport: TransportSocket,
        config: ConnectionConfig,
        codec: Arc<dyn Codec>,
        connector: Arc<dyn Connector>,
    ) -> Result<Self> {
        config.validate()?;
        let connection = Self::with_state(config, codec, connector, ConnectionState::Connected);
        connection.attach(transport);
        Ok(connection)
    }

    /// Opens a transport with `connector`, performs the join handshake, and
    /// returns the CONNECTED connection with the join result.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] / [`Error::Url`] for bad configuration or URL
    /// - [`Error::Connection`] / [`Error::ConnectionTimeout`] if the
    ///   transport cannot be opened
    /// - the join request's error if the handshake fails
    pub async fn connect(
        connector: Arc<dyn Connector>,
        credentials: &TransportCredentials,
        reconnect_token: Option<&str>,
        config: ConnectionConfig,
    ) -> Result<(Self, JoinResult)> {
        Self::connect_with(connector, Arc::new(JsonCodec), credentials, reconnect_token, config).await
    }

    /// Like [`connect`](Self::connect) with an explicit codec, used for the
    /// join and for every later transport.
    ///
    /// # Errors
    ///
    /// See [`connect`](Self::connect).
    pub async fn connect_with(
        connector: Arc<dyn Connector>,
        codec: Arc<dyn Codec>,
        credentials: &TransportCredentials,
        reconnect_token: Option<&str>,
        config: ConnectionConfig,
    ) -> Result<(Self, JoinResult)> {
        config.validate()?;
        let url = credentials.transport_url(reconnect_token)?;
        let socket = connector.connect(&url, &config.transport).await?;

        let connection = Self::with_state(config, codec, connector, ConnectionState::Connecting);
        connection.attach(socket.clone());

        match connection.join(&socket).await {
            Ok(joined) => {
                connection.apply(ConnectionEvent::JoinSucceeded);
                info!(transport_id = %socket.id(), "Connection joined");
                Ok((connection, joined))
            }
            Err(e) => {
                warn!(error = %e, "Join failed");
                connection.dispose();
                Err(e)
            }
        }
    }

    fn with_state(
        config: ConnectionConfig,
        codec: Arc<dyn Codec>,
        connector: Arc<dyn Connector>,
        state: ConnectionState,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                config,
                codec,
                connector,
                state: Mutex::new(state),
                disposed: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                transport: Mutex::new(None),
                heartbeat_check: Mutex::new(None),
                pending: PendingRequests::new(),
                notifications: NotificationDispatcher::new(),
                on_state_change: Emitter::new(),
                on_message: Emitter::new(),
                on_request_error: Emitter::new(),
            }),
        }
    }
}

// ============================================================================
// Connection - Accessors
// ============================================================================

impl Connection {
    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Returns `true` while CONNECTED.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns `true` after [`dispose`](Self::dispose).
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Returns the number of in-flight requests.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Returns the id of the live transport, if any.
    #[must_use]
    pub fn transport_id(&self) -> Option<TransportId> {
        self.inner.transport.lock().as_ref().map(|t| t.socket.id())
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    fn current_transport(&self) -> Option<TransportSocket> {
        self.inner.transport.lock().as_ref().map(|t| t.socket.clone())
    }

    fn is_current(&self, transport_id: TransportId) -> bool {
        self.inner
            .transport
            .lock()
            .as_ref()
            .is_some_and(|t| t.socket.id() == transport_id)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        Ok(())
    }
}

// ============================================================================
// Connection - Requests
// ============================================================================

impl Connection {
    /// Sends a request and waits for its result with the default timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] after disposal
    /// - [`Error::Protocol`] if the agent answers with an error
    /// - [`Error::RequestTimeout`] if no answer arrives in time
    /// - [`Error::NotOpen`] / [`Error::ConnectionClosed`] if the frame
    ///   cannot be handed to a transport
    pub async fn request(&self, method: impl Into<String>, params: Value) -> Result<Value> {
        self.request_with(method, params, RequestOptions::default()).await
    }

    /// Sends a request with per-request options.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request).
    pub async fn request_with(&self, method: impl Into<String>, params: Value, options: RequestOptions) -> Result<Value> {
        self.start_request(method, params, options)?.result().await
    }

    /// Sends a request with serialized params and deserializes its result.
    ///
    /// # Errors
    ///
    /// See [`request`](Self::request); additionally
    /// [`Error::UnexpectedResponse`] if the result does not match `R`.
    pub async fn request_typed<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let result = self.request(method, params).await?;
        serde_json::from_value(result).map_err(|e| Error::unexpected_response(method, e.to_string()))
    }

    /// Registers and sends a request, returning its handle without waiting.
    ///
    /// A send failure is reported to [`on_request_error`](Self::on_request_error)
    /// listeners and settles the handle with that error.
    ///
    /// # Errors
    ///
    /// Fails immediately with [`Error::Disposed`] after disposal, or with
    /// the codec error if the request cannot be encoded.
    pub fn start_request(&self, method: impl Into<String>, params: Value, options: RequestOptions) -> Result<PendingHandle> {
        self.ensure_live()?;

        let id = RequestId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let request = OutboundRequest::new(id, method, params);
        let bytes = self.inner.codec.encode(&request)?;

        let timeout = options.timeout.unwrap_or(self.inner.config.request_timeout);
        let handle = self.inner.pending.register(id, request.method.clone(), timeout)?;

        let sent = match self.current_transport() {
            Some(socket) => socket.send(bytes),
            None => Err(Error::ConnectionClosed),
        };

        match sent {
            Ok(()) => trace!(request_id = %id, method = %request.method, "Request sent"),
            Err(error) => {
                warn!(request_id = %id, method = %request.method, error = %error, "Request send failed");
                self.inner.on_request_error.emit(&RequestFailure {
                    request,
                    error: error.to_string(),
                });
                self.inner.pending.reject(id, error);
            }
        }

        Ok(handle)
    }
}

// ============================================================================
// Connection - Events
// ============================================================================

impl Connection {
    /// Subscribes to notifications for `method`.
    pub fn on_notification<F>(&self, method: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.notifications.subscribe(method, handler)
    }

    /// Subscribes to state transitions.
    pub fn on_state_change<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.inner.on_state_change.subscribe(listener)
    }

    /// Subscribes to every decoded inbound envelope, before routing.
    pub fn on_message<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.inner.on_message.subscribe(listener)
    }

    /// Subscribes to request send failures.
    pub fn on_request_error<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RequestFailure) + Send + Sync + 'static,
    {
        self.inner.on_request_error.subscribe(listener)
    }
}

// ============================================================================
// Connection - Lifecycle
// ============================================================================

impl Connection {
    /// Replaces the transport and replays the join handshake.
    ///
    /// Does nothing unless the connection is DISCONNECTED or HIBERNATED, so
    /// concurrent calls produce one join. `start_transport` supplies fresh
    /// credentials; `reconnect_token` resumes the previous session.
    ///
    /// Requests that were in flight on the old transport are not resent.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] after disposal
    /// - any error from `start_transport`, the connector, or the join; the
    ///   connection is DISCONNECTED afterwards
    pub async fn reconnect<F, Fut>(&self, reconnect_token: Option<String>, start_transport: F) -> Result<ReconnectOutcome>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<TransportCredentials>> + Send,
    {
        self.ensure_live()?;

        if self.apply(ConnectionEvent::ReconnectStarted).is_none() {
            let state = self.state();
            debug!(state = %state, "Reconnect skipped");
            return Ok(ReconnectOutcome::Skipped { state });
        }

        info!(resuming = reconnect_token.is_some(), "Reconnecting");

        match self.establish(reconnect_token.as_deref(), start_transport).await {
            Ok(joined) => {
                if self.apply(ConnectionEvent::JoinSucceeded).is_none() {
                    return Err(Error::Disposed);
                }
                info!(transport_id = ?self.transport_id(), "Reconnected");
                Ok(ReconnectOutcome::Reconnected(joined))
            }
            Err(e) => {
                warn!(error = %e, "Reconnect failed");
                self.apply(ConnectionEvent::JoinFailed);
                Err(e)
            }
        }
    }

    /// Waits for every in-flight request to settle, then closes the
    /// transport and moves to DISCONNECTED.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] after disposal
    /// - [`Error::InvalidState`] if a reconnect is in progress once the
    ///   requests have drained; the connection is left as it was
    pub async fn disconnect(&self) -> Result<()> {
        self.ensure_live()?;

        let in_flight = self.inner.pending.len();
        if in_flight > 0 {
            debug!(in_flight, "Waiting for in-flight requests before disconnecting");
        }
        self.inner.pending.wait_drained().await;

        if self.apply(ConnectionEvent::Disconnect).is_some() {
            return Ok(());
        }
        self.ensure_live()?;
        match self.state() {
            ConnectionState::Disconnected => Ok(()),
            state => Err(Error::invalid_state("disconnect", state)),
        }
    }

    /// Tears the connection down for good.
    ///
    /// Disposes the transport, rejects every in-flight request with
    /// [`Error::Disposed`], and drops all listeners. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        self.cancel_heartbeat_check();
        self.detach_transport();

        let rejected = self.inner.pending.dispose();
        self.inner.notifications.close();
        self.inner.on_message.close();
        self.inner.on_request_error.close();
        self.inner.on_state_change.close();

        info!(rejected, "Connection disposed");
    }

    async fn establish<F, Fut>(&self, reconnect_token: Option<&str>, start_transport: F) -> Result<JoinResult>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<TransportCredentials>> + Send,
    {
        let credentials = start_transport().await?;
        self.ensure_live()?;

        let url = credentials.transport_url(reconnect_token)?;
        let socket = self.inner.connector.connect(&url, &self.inner.config.transport).await?;
        if self.is_disposed() {
            socket.dispose();
            return Err(Error::Disposed);
        }

        self.attach(socket.clone());
        self.join(&socket).await
    }

    /// Sends `client/join` on `socket`, failing early if it disconnects.
    async fn join(&self, socket: &TransportSocket) -> Result<JoinResult> {
        let (lost_tx, lost_rx) = oneshot::channel::<DisconnectReason>();
        let lost_tx = Mutex::new(Some(lost_tx));
        let lost = socket.on_disconnected(move |reason| {
            if let Some(tx) = lost_tx.lock().take() {
                let _ = tx.send(reason.clone());
            }
        });

        let params = serde_json::to_value(self.join_params())?;
        let handle = match self.start_request(JOIN_METHOD, params, RequestOptions::default()) {
            Ok(handle) => handle,
            Err(e) => {
                lost.unsubscribe();
                return Err(e);
            }
        };
        let join_id = handle.id();

        let outcome = tokio::select! {
            result = handle.result() => result,
            reason = lost_rx => Err(Error::connection(match reason {
                Ok(reason) => format!("transport lost during join: {reason}"),
                Err(_) => "transport closed during join".to_string(),
            })),
        };
        lost.unsubscribe();

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.inner.pending.reject(join_id, Error::ConnectionClosed);
                return Err(e);
            }
        };

        serde_json::from_value(result).map_err(|e| Error::unexpected_response(JOIN_METHOD, e.to_string()))
    }

    /// Join params: configured subscriptions plus methods with handlers.
    fn join_params(&self) -> JoinParams {
        let config = &self.inner.config;
        let mut subscriptions = config.subscriptions.clone();
        for method in self.inner.notifications.methods() {
            if !subscriptions.contains(&method) {
                subscriptions.push(method);
            }
        }

        JoinParams {
            client_info: config.client_info.clone(),
            async_progress: config.async_progress,
            subscriptions,
        }
    }
}

// ============================================================================
// Connection - State Machine
// ============================================================================

impl Connection {
    /// Applies `event`, running the resulting effects outside the state
    /// lock. Returns the new state, or `None` if the event did not apply.
    fn apply(&self, event: ConnectionEvent) -> Option<ConnectionState> {
        let step = {
            let mut state = self.inner.state.lock();
            if self.is_disposed() {
                return None;
            }
            let current = *state;
            let Some(step) = transition(current, event) else {
                trace!(state = %current, ?event, "Event ignored");
                return None;
            };
            debug!(from = %current, to = %step.state, ?event, "State transition");
            *state = step.state;
            step
        };

        for effect in &step.effects {
            self.run_effect(*effect);
        }
        Some(step.state)
    }

    fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::DisposeTransport => {
                self.cancel_heartbeat_check();
                self.detach_transport();
            }

            Effect::PendingStranded => {
                if self.inner.config.reject_pending_on_disconnect {
                    self.inner.pending.reject_all(|| Error::ConnectionClosed);
                } else if !self.inner.pending.is_empty() {
                    debug!(
                        pending = self.inner.pending.len(),
                        "Requests stranded by disconnect will time out"
                    );
                }
            }

            Effect::NotifyState(state) => {
                info!(state = %state, "Connection state changed");
                self.inner.on_state_change.emit(&state);
            }
        }
    }
}

// ============================================================================
// Connection - Transport Events
// ============================================================================

impl Connection {
    /// Makes `socket` the live transport, releasing any previous one.
    fn attach(&self, socket: TransportSocket) {
        let transport_id = socket.id();
        let weak = Arc::downgrade(&self.inner);

        let on_message = {
            let weak = weak.clone();
            socket.on_message(move |bytes| {
                if let Some(inner) = weak.upgrade() {
                    Connection { inner }.handle_frame(transport_id, bytes);
                }
            })
        };
        let on_disconnected = {
            let weak = weak.clone();
            socket.on_disconnected(move |reason| {
                if let Some(inner) = weak.upgrade() {
                    Connection { inner }.handle_transport_lost(transport_id, reason);
                }
            })
        };
        let on_missing_heartbeat = socket.on_missing_heartbeat(move |silence| {
            if let Some(inner) = weak.upgrade() {
                Connection { inner }.handle_missing_heartbeat(transport_id, *silence);
            }
        });

        let already_closed = socket.is_disposed();
        let previous = self.inner.transport.lock().replace(AttachedTransport {
            socket,
            subscriptions: vec![on_message, on_disconnected, on_missing_heartbeat],
        });
        if let Some(previous) = previous {
            previous.release();
        }

        debug!(transport_id = %transport_id, "Transport attached");

        if already_closed {
            self.handle_transport_lost(transport_id, &DisconnectReason::NotOpen);
        }
    }

    fn detach_transport(&self) {
        let attached = self.inner.transport.lock().take();
        if let Some(attached) = attached {
            attached.release();
        }
    }

    fn handle_frame(&self, transport_id: TransportId, bytes: &[u8]) {
        if self.is_disposed() || !self.is_current(transport_id) {
            trace!(transport_id = %transport_id, "Dropping frame from stale transport");
            return;
        }

        self.cancel_heartbeat_check();

        let envelope = match self.inner.codec.decode(bytes) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(transport_id = %transport_id, len = bytes.len(), error = %e, "Dropping undecodable frame");
                return;
            }
        };

        self.inner.on_message.emit(&envelope);

        match envelope {
            Envelope::Notification { method, params } => {
                if method == HIBERNATE_METHOD {
                    info!("Agent is hibernating");
                    self.apply(ConnectionEvent::HibernateReceived);
                }
                self.inner.notifications.dispatch(&method, &params);
            }

            Envelope::Success { id, result, .. } => {
                self.inner.pending.resolve(id, Ok(result));
            }

            Envelope::Error { id, error, .. } => {
                self.inner.pending.resolve(id, Err(error.into()));
            }
        }
    }

    fn handle_transport_lost(&self, transport_id: TransportId, reason: &DisconnectReason) {
        if !self.is_current(transport_id) {
            trace!(transport_id = %transport_id, "Ignoring disconnect from stale transport");
            return;
        }
        warn!(transport_id = %transport_id, reason = %reason, "Transport disconnected");
        self.apply(ConnectionEvent::TransportLost);
    }

    /// Defers the disconnect decision by the heartbeat grace window.
    fn handle_missing_heartbeat(&self, transport_id: TransportId, silence: Duration) {
        if self.is_disposed() || !self.is_current(transport_id) {
            return;
        }

        let mut slot = self.inner.heartbeat_check.lock();
        if slot.as_ref().is_some_and(|check| !check.is_finished()) {
            return;
        }

        debug!(
            silence_ms = silence.as_millis() as u64,
            grace_ms = self.inner.config.heartbeat_grace.as_millis() as u64,
            "Heartbeat missing; checking again after grace window"
        );
        *slot = Some(self.spawn_heartbeat_check(transport_id));
    }

    fn spawn_heartbeat_check(&self, transport_id: TransportId) -> JoinHandle<()> {
        let grace = self.inner.config.heartbeat_grace;
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            if let Some(inner) = weak.upgrade() {
                Connection { inner }.check_heartbeat(transport_id);
            }
        })
    }

    /// Disconnects only if the transport is still current, CONNECTED, and
    /// idle. In-flight requests defer the decision by another grace window;
    /// any inbound frame cancels the re-armed check.
    fn check_heartbeat(&self, transport_id: TransportId) {
        if !self.is_current(transport_id) || self.state() != ConnectionState::Connected {
            return;
        }

        let pending = self.inner.pending.len();
        if pending > 0 {
            debug!(pending, "Heartbeat missing with requests in flight; checking again after grace window");
            let next = self.spawn_heartbeat_check(transport_id);
            // The running check is finishing; replacing it does not abort it.
            *self.inner.heartbeat_check.lock() = Some(next);
            return;
        }

        warn!(transport_id = %transport_id, "Heartbeat lost; disconnecting");
        self.apply(ConnectionEvent::TransportLost);
    }

    fn cancel_heartbeat_check(&self) {
        let check = self.inner.heartbeat_check.lock().take();
        if let Some(check) = check {
            check.abort();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
