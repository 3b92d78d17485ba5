//! Observer primitive used for every event stream in the crate.
//!
//! An [`Emitter`] holds an ordered list of listeners. [`Emitter::subscribe`]
//! returns a [`Subscription`] whose [`Subscription::unsubscribe`] removes
//! exactly that listener.
//!
//! # Dispatch Semantics
//!
//! - Listeners run synchronously, in subscription order.
//! - Each emit iterates a snapshot taken when the emit starts; listeners
//!   added or removed during an emit take effect from the next one.
//! - A panicking listener is logged and skipped; later listeners still run.
//! - No lock is held while listeners run, so a listener may subscribe,
//!   unsubscribe, or emit again.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::warn;

use crate::identifiers::SubscriptionId;

// ============================================================================
// Types
// ============================================================================

/// Shared listener callback.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Listener list guarded by the emitter lock.
struct Slots<T> {
    listeners: Vec<(SubscriptionId, Listener<T>)>,
    closed: bool,
}

// ============================================================================
// Emitter
// ============================================================================

/// Ordered, token-addressed list of listeners for one event stream.
pub struct Emitter<T> {
    slots: Arc<Mutex<Slots<T>>>,
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(Slots {
                listeners: Vec::new(),
                closed: false,
            })),
        }
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("Emitter")
            .field("listeners", &slots.listeners.len())
            .field("closed", &slots.closed)
            .finish()
    }
}

impl<T: 'static> Emitter<T> {
    /// Creates an emitter with no listeners.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a listener and returns its unsubscribe handle.
    ///
    /// Subscribing to a closed emitter returns an inert handle.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        {
            let mut slots = self.slots.lock();
            if slots.closed {
                return Subscription::inert(id);
            }
            slots.listeners.push((id, Arc::new(listener)));
        }

        let weak: Weak<Mutex<Slots<T>>> = Arc::downgrade(&self.slots);
        Subscription::new(id, move || {
            if let Some(slots) = weak.upgrade() {
                slots.lock().listeners.retain(|(sid, _)| *sid != id);
            }
        })
    }

    /// Invokes every listener with `value`, returning how many ran.
    pub fn emit(&self, value: &T) -> usize {
        let snapshot: Vec<Listener<T>> = {
            let slots = self.slots.lock();
            slots.listeners.iter().map(|(_, l)| Arc::clone(l)).collect()
        };

        for listener in &snapshot {
            invoke_guarded(listener.as_ref(), value, "event listener");
        }

        snapshot.len()
    }

    /// Returns the number of registered listeners.
    #[inline]
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.slots.lock().listeners.len()
    }

    /// Removes all listeners and rejects future subscriptions.
    pub fn close(&self) {
        let mut slots = self.slots.lock();
        slots.closed = true;
        slots.listeners.clear();
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slots.lock().closed
    }
}

/// Runs a listener, containing any panic it raises.
pub(crate) fn invoke_guarded<T: ?Sized>(listener: &(dyn Fn(&T) + Send + Sync), value: &T, context: &str) {
    if catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
        warn!(context, "Listener panicked; continuing with remaining listeners");
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle removing one listener.
///
/// Dropping the handle does not unsubscribe; call
/// [`unsubscribe`](Self::unsubscribe). Unsubscribing is idempotent and safe
/// from inside a listener.
pub struct Subscription {
    id: SubscriptionId,
    remove: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

impl Subscription {
    /// Creates a handle running `remove` on first unsubscribe.
    pub(crate) fn new(id: SubscriptionId, remove: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            remove: Mutex::new(Some(Box::new(remove))),
        }
    }

    /// Creates a handle that removes nothing.
    pub(crate) fn inert(id: SubscriptionId) -> Self {
        Self {
            id,
            remove: Mutex::new(None),
        }
    }

    /// Returns the subscription token.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns `true` until the first unsubscribe.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.remove.lock().is_some()
    }

    /// Removes the listener. Later calls are no-ops.
    pub fn unsubscribe(&self) {
        let remove = self.remove.lock().take();
        if let Some(remove) = remove {
            remove();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
