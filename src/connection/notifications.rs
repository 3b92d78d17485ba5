//! Notification routing by method name.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::trace;

use crate::event::{Emitter, Subscription};
use crate::identifiers::SubscriptionId;

// ============================================================================
// NotificationDispatcher
// ============================================================================

/// Routes inbound notifications to the handlers registered for their method.
///
/// Handlers for one method run in registration order. A panicking handler is
/// logged and the rest still run. Dispatching a method nobody listens to is
/// a no-op.
#[derive(Default)]
pub struct NotificationDispatcher {
    inner: Arc<Mutex<DispatcherInner>>,
}

#[derive(Default)]
struct DispatcherInner {
    handlers: FxHashMap<String, Arc<Emitter<Value>>>,
    closed: bool,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("methods", &self.methods())
            .finish()
    }
}

impl NotificationDispatcher {
    /// Creates an empty dispatcher.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method`.
    ///
    /// A method's entry is dropped when its last handler unsubscribes.
    /// After [`close`](Self::close) the returned handle is inert.
    pub fn subscribe<F>(&self, method: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let method = method.into();

        // Subscribing under the dispatcher lock keeps pruning from racing it.
        let (emitter, subscription) = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Subscription::inert(SubscriptionId::next());
            }
            let emitter = Arc::clone(inner.handlers.entry(method.clone()).or_default());
            let subscription = emitter.subscribe(handler);
            (emitter, subscription)
        };

        let weak = Arc::downgrade(&self.inner);
        Subscription::new(subscription.id(), move || {
            subscription.unsubscribe();
            if let Some(inner) = weak.upgrade() {
                prune(&inner, &method, &emitter);
            }
        })
    }

    /// Delivers `params` to every handler of `method`, returning how many ran.
    pub fn dispatch(&self, method: &str, params: &Value) -> usize {
        let emitter = self.inner.lock().handlers.get(method).cloned();
        match emitter {
            Some(emitter) => emitter.emit(params),
            None => {
                trace!(method, "No handlers for notification");
                0
            }
        }
    }

    /// Returns the number of handlers registered for `method`.
    #[must_use]
    pub fn handler_count(&self, method: &str) -> usize {
        self.inner
            .lock()
            .handlers
            .get(method)
            .map_or(0, |emitter| emitter.listener_count())
    }

    /// Returns the methods that currently have at least one handler, sorted.
    #[must_use]
    pub fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self
            .inner
            .lock()
            .handlers
            .iter()
            .filter(|(_, emitter)| emitter.listener_count() > 0)
            .map(|(method, _)| method.clone())
            .collect();
        methods.sort_unstable();
        methods
    }

    /// Drops every handler and rejects future registrations.
    pub fn close(&self) {
        let handlers = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            std::mem::take(&mut inner.handlers)
        };
        for emitter in handlers.values() {
            emitter.close();
        }
    }
}

/// Removes `method`'s entry if it is still `emitter` and has no listeners.
fn prune(inner: &Mutex<DispatcherInner>, method: &str, emitter: &Arc<Emitter<Value>>) {
    let mut inner = inner.lock();
    let idle = inner
        .handlers
        .get(method)
        .is_some_and(|current| Arc::ptr_eq(current, emitter) && current.listener_count() == 0);
    if idle {
        inner.handlers.remove(method);
        trace!(method, "Dropped idle notification method");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    #[test]
    fn test_dispatch_reaches_only_matching_method() {
        let dispatcher = NotificationDispatcher::new();
        let out = Arc::new(AtomicUsize::new(0));
        let exit = Arc::new(AtomicUsize::new(0));

        let o = Arc::clone(&out);
        let _s1 = dispatcher.subscribe("shell/out", move |_| {
            o.fetch_add(1, Ordering::SeqCst);
        });
        let e = Arc::clone(&exit);
        let _s2 = dispatcher.subscribe("shell/exit", move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(dispatcher.dispatch("shell/out", &json!({"data": "hi"})), 1);
        assert_eq!(out.load(Ordering::SeqCst), 1);
        assert_eq!(exit.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_method_is_noop() {
        let dispatcher = NotificationDispatcher::new();
        assert_eq!(dispatcher.dispatch("nobody/listens", &Value::Null), 0);
    }

    #[test]
    fn test_unsubscribe_removes_one_handler() {
        let dispatcher = NotificationDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&calls);
        let first = dispatcher.subscribe("port/changed", move |_| {
            c1.fetch_add(1, Ordering::SeqCst);
        });
        let c2 = Arc::clone(&calls);
        let _second = dispatcher.subscribe("port/changed", move |_| {
            c2.fetch_add(10, Ordering::SeqCst);
        });

        first.unsubscribe();
        first.unsubscribe();
        dispatcher.dispatch("port/changed", &Value::Null);

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(dispatcher.handler_count("port/changed"), 1);
    }

    #[test]
    fn test_methods_lists_active_only() {
        let dispatcher = NotificationDispatcher::new();
        let a = dispatcher.subscribe("task/update", |_| {});
        let _b = dispatcher.subscribe("fs/watchEvent", |_| {});
        a.unsubscribe();

        assert_eq!(dispatcher.methods(), vec!["fs/watchEvent".to_string()]);
    }

    #[test]
    fn test_last_unsubscribe_drops_method_entry() {
        let dispatcher = NotificationDispatcher::new();
        let a = dispatcher.subscribe("fs/watchEvent", |_| {});
        let b = dispatcher.subscribe("fs/watchEvent", |_| {});
        let _other = dispatcher.subscribe("shell/out", |_| {});
        assert_eq!(dispatcher.inner.lock().handlers.len(), 2);

        a.unsubscribe();
        assert!(dispatcher.inner.lock().handlers.contains_key("fs/watchEvent"));
        b.unsubscribe();
        assert!(!dispatcher.inner.lock().handlers.contains_key("fs/watchEvent"));
        assert_eq!(dispatcher.inner.lock().handlers.len(), 1);

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let _again = dispatcher.subscribe("fs/watchEvent", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(dispatcher.dispatch("fs/watchEvent", &Value::Null), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_handler_isolated() {
        let dispatcher = NotificationDispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let _s1 = dispatcher.subscribe("setup/progress", |_| panic!("boom"));
        let c = Arc::clone(&calls);
        let _s2 = dispatcher.subscribe("setup/progress", move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(dispatcher.dispatch("setup/progress", &Value::Null), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_rejects_future_handlers() {
        let dispatcher = NotificationDispatcher::new();
        let _s = dispatcher.subscribe("shell/out", |_| {});
        dispatcher.close();

        let late = dispatcher.subscribe("shell/out", |_| {});
        assert!(!late.is_active());
        assert_eq!(dispatcher.dispatch("shell/out", &Value::Null), 0);
    }
}
