//! Ordered subscription lists
//!
//! Handlers run synchronously in registration order on the task that
//! publishes the event. The list lock is released before any handler runs,
//! so a handler may subscribe further handlers or query the gateway.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Boxed state-change handler
pub type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

/// Append-only list of handlers for one event source
pub struct Observers<T> {
    handlers: Mutex<Vec<Handler<T>>>,
}

impl<T: Copy> Observers<T> {
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(Vec::new()),
        }
    }

    /// Append a handler
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        self.lock().push(Arc::new(handler));
    }

    /// Invoke every handler registered so far, in order
    pub fn notify(&self, value: T) {
        let snapshot: Vec<Handler<T>> = self.lock().clone();
        for handler in snapshot {
            handler(value);
        }
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Handler<T>>> {
        // Handlers never run under the lock; a poisoned list is still intact
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Copy> Default for Observers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Observers<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.handlers.lock().map(|h| h.len()).unwrap_or(0);
        f.debug_struct("Observers").field("handlers", &count).finish()
    }
}
