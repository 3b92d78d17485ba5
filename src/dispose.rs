//! Run-once cleanup registry.
//!
//! Components register teardown steps as they acquire resources; disposing
//! runs them in reverse registration order, exactly once.

use std::fmt;

use parking_lot::Mutex;

// ============================================================================
// DisposeStack
// ============================================================================

type Cleanup = Box<dyn FnOnce() + Send>;

/// Reverse-order, run-at-most-once cleanup stack.
#[derive(Default)]
pub struct DisposeStack {
    /// `None` once disposed.
    steps: Mutex<Option<Vec<Cleanup>>>,
}

impl fmt::Debug for DisposeStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps = self.steps.lock();
        f.debug_struct("DisposeStack")
            .field("pending", &steps.as_ref().map_or(0, Vec::len))
            .field("disposed", &steps.is_none())
            .finish()
    }
}

impl DisposeStack {
    /// Creates an empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(Some(Vec::new())),
        }
    }

    /// Registers a cleanup step.
    ///
    /// After disposal the step runs immediately instead.
    pub fn push(&self, step: impl FnOnce() + Send + 'static) {
        let mut guard = self.steps.lock();
        match guard.as_mut() {
            Some(steps) => steps.push(Box::new(step)),
            None => {
                drop(guard);
                step();
            }
        }
    }

    /// Runs every registered step, newest first. Returns `false` if the
    /// stack was already disposed.
    pub fn dispose(&self) -> bool {
        // Take under the lock, run outside it: steps may push or dispose again.
        let Some(steps) = self.steps.lock().take() else {
            return false;
        };

        for step in steps.into_iter().rev() {
            step();
        }
        true
    }

    /// Returns `true` once disposed.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.steps.lock().is_none()
    }
}

// ============================================================================
// Tests
// ============================================================================
