//! In-flight request tracking.
//!
//! Each registered request owns a oneshot sender and a timeout timer. The
//! first of resolve, reject, timeout, or dispose to remove the entry settles
//! it; every later attempt finds nothing and is a no-op.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

// ============================================================================
// Constants
// ============================================================================

/// Maximum in-flight requests before new ones are refused.
pub const MAX_PENDING_REQUESTS: usize = 10_000;

// ============================================================================
// Types
// ============================================================================

struct PendingEntry {
    method: String,
    response_tx: oneshot::Sender<Result<Value>>,
    timer: JoinHandle<()>,
}

struct Table {
    entries: FxHashMap<RequestId, PendingEntry>,
    disposed: bool,
}

struct Shared {
    table: Mutex<Table>,
    count_tx: watch::Sender<usize>,
}

impl Shared {
    /// Removes `id` and delivers `outcome` to its waiter. Returns `false`
    /// when the entry was already settled.
    fn settle(&self, id: RequestId, outcome: Result<Value>) -> bool {
        let entry = {
            let mut table = self.table.lock();
            let entry = table.entries.remove(&id);
            if entry.is_some() {
                self.count_tx.send_replace(table.entries.len());
            }
            entry
        };

        let Some(entry) = entry else {
            return false;
        };

        entry.timer.abort();
        if entry.response_tx.send(outcome).is_err() {
            trace!(request_id = %id, method = %entry.method, "Waiter dropped before settlement");
        }
        true
    }

    /// Removes every entry, returning them.
    fn drain(&self, dispose: bool) -> Vec<(RequestId, PendingEntry)> {
        let mut table = self.table.lock();
        if dispose {
            table.disposed = true;
        }
        let drained: Vec<_> = table.entries.drain().collect();
        self.count_tx.send_replace(0);
        drained
    }
}

// ============================================================================
// PendingRequests
// ============================================================================

/// Table of requests awaiting a response, keyed by request id.
pub struct PendingRequests {
    shared: Arc<Shared>,
}

impl Default for PendingRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequests")
            .field("len", &self.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl PendingRequests {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                table: Mutex::new(Table {
                    entries: FxHashMap::default(),
                    disposed: false,
                }),
                count_tx,
            }),
        }
    }

    /// Registers request `id` and arms its timeout.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] after [`dispose`](Self::dispose)
    /// - [`Error::InvalidArgument`] if `id` is already in flight
    /// - [`Error::Connection`] if [`MAX_PENDING_REQUESTS`] is reached
    pub fn register(&self, id: RequestId, method: impl Into<String>, timeout: Duration) -> Result<PendingHandle> {
        let method = method.into();
        let (response_tx, response_rx) = oneshot::channel();

        let mut table = self.shared.table.lock();
        if table.disposed {
            return Err(Error::Disposed);
        }
        if table.entries.contains_key(&id) {
            return Err(Error::invalid_argument(format!("request id {id} already in flight")));
        }
        if table.entries.len() >= MAX_PENDING_REQUESTS {
            warn!(
                pending = table.entries.len(),
                max = MAX_PENDING_REQUESTS,
                "Too many pending requests"
            );
            return Err(Error::connection(format!(
                "Too many pending requests: {}/{}",
                table.entries.len(),
                MAX_PENDING_REQUESTS
            )));
        }

        let timer = tokio::spawn(expire(
            Arc::downgrade(&self.shared),
            id,
            method.clone(),
            timeout,
        ));

        table.entries.insert(
            id,
            PendingEntry {
                method: method.clone(),
                response_tx,
                timer,
            },
        );
        self.shared.count_tx.send_replace(table.entries.len());
        drop(table);

        trace!(request_id = %id, method = %method, "Request registered");

        Ok(PendingHandle {
            id,
            method,
            response_rx,
            shared: Arc::downgrade(&self.shared),
        })
    }

    /// Settles `id` with `outcome`. Unknown or already settled ids are
    /// dropped and `false` is returned.
    pub fn resolve(&self, id: RequestId, outcome: Result<Value>) -> bool {
        let settled = self.shared.settle(id, outcome);
        if !settled {
            debug!(request_id = %id, "Dropping response for unknown request");
        }
        settled
    }

    /// Rejects `id` with `error`.
    pub fn reject(&self, id: RequestId, error: Error) -> bool {
        self.shared.settle(id, Err(error))
    }

    /// Rejects every in-flight request with the error built by `make_error`,
    /// leaving the table usable. Returns how many were rejected.
    pub fn reject_all(&self, make_error: impl Fn() -> Error) -> usize {
        settle_all(self.shared.drain(false), make_error)
    }

    /// Rejects every in-flight request with [`Error::Disposed`] and refuses
    /// new registrations. Returns how many were rejected.
    pub fn dispose(&self) -> usize {
        settle_all(self.shared.drain(true), || Error::Disposed)
    }

    /// Waits until no request is in flight.
    pub async fn wait_drained(&self) {
        let mut count_rx = self.shared.count_tx.subscribe();
        // The sender lives as long as `self`, so this only fails if the
        // table is dropped mid-wait.
        let _ = count_rx.wait_for(|count| *count == 0).await;
    }

    /// Returns the number of in-flight requests.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.table.lock().entries.len()
    }

    /// Returns `true` if nothing is in flight.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if `id` is in flight.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: RequestId) -> bool {
        self.shared.table.lock().entries.contains_key(&id)
    }

    /// Returns `true` after [`dispose`](Self::dispose).
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.shared.table.lock().disposed
    }
}

fn settle_all(drained: Vec<(RequestId, PendingEntry)>, make_error: impl Fn() -> Error) -> usize {
    let count = drained.len();
    for (_, entry) in drained {
        entry.timer.abort();
        let _ = entry.response_tx.send(Err(make_error()));
    }
    if count > 0 {
        debug!(count, "Rejected pending requests");
    }
    count
}

/// Timer body: rejects the request once `timeout` elapses.
async fn expire(shared: Weak<Shared>, id: RequestId, method: String, timeout: Duration) {
    tokio::time::sleep(timeout).await;
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let timeout_ms = timeout.as_millis() as u64;
    if shared.settle(id, Err(Error::request_timeout(id, method.clone(), timeout_ms))) {
        warn!(request_id = %id, method = %method, timeout_ms, "Request timed out");
    }
}

// ============================================================================
// PendingHandle
// ============================================================================

/// Caller's side of one registered request.
pub struct PendingHandle {
    id: RequestId,
    method: String,
    response_rx: oneshot::Receiver<Result<Value>>,
    shared: Weak<Shared>,
}

impl fmt::Debug for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle")
            .field("id", &self.id)
            .field("method", &self.method)
            .finish()
    }
}

impl PendingHandle {
    /// Returns the request id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the request method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Rejects the request with [`Error::Disposed`] if it is still in flight.
    pub fn dispose(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.settle(self.id, Err(Error::Disposed));
        }
    }

    /// Waits for the outcome.
    ///
    /// # Errors
    ///
    /// The protocol error, timeout, or rejection that settled the request.
    pub async fn result(self) -> Result<Value> {
        match self.response_rx.await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::Disposed),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
