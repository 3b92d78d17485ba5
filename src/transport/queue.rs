//! Ordered delivery queue.
//!
//! Frame materialization may be asynchronous and take arbitrarily long, but
//! delivery must follow arrival order. The queue runs exactly one
//! materialization at a time, FIFO, on a dedicated task, so the read loop
//! never waits on delivery.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;

use futures_util::FutureExt;
use futures_util::future::{BoxFuture, ready};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

// ============================================================================
// OrderedQueue
// ============================================================================

/// Single-concurrency FIFO of pending deliveries.
///
/// Each pushed item resolves to `Some(value)` (delivered) or `None`
/// (dropped). Item N+1 is not polled until item N has been delivered.
pub struct OrderedQueue<T> {
    tx: mpsc::UnboundedSender<BoxFuture<'static, Option<T>>>,
    worker: JoinHandle<()>,
}

impl<T: Send + 'static> OrderedQueue<T> {
    /// Creates a queue delivering into `deliver`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(T) + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxFuture<'static, Option<T>>>();

        let worker = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                if let Some(value) = item.await {
                    deliver(value);
                }
            }
            trace!("Ordered queue drained and closed");
        });

        Self { tx, worker }
    }

    /// Enqueues an already materialized value.
    ///
    /// Returns `false` if the queue is closed.
    pub fn push_ready(&self, value: T) -> bool {
        self.tx.send(ready(Some(value)).boxed()).is_ok()
    }

    /// Enqueues an asynchronous materialization.
    ///
    /// Returns `false` if the queue is closed.
    pub fn push<Fut>(&self, materialize: Fut) -> bool
    where
        Fut: Future<Output = Option<T>> + Send + 'static,
    {
        self.tx.send(materialize.boxed()).is_ok()
    }

    /// Stops delivery; queued items are dropped.
    pub fn close(&self) {
        self.worker.abort();
    }
}

impl<T> Drop for OrderedQueue<T> {
    fn drop(&mut self) {
        self.worker.abort();
    }
}

// ============================================================================
// Tests
// ============================================================================
