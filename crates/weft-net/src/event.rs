//! Synchronous publish/subscribe plumbing
//!
//! Transports re-emit peer state changes through listener registries rather
//! than a global event bus. Delivery is synchronous and in registration
//! order.

use parking_lot::Mutex;
use std::sync::Arc;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_key: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// A registry of listeners for one event kind.
pub struct Listeners<T> {
    inner: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Listeners<T> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Registry {
                next_key: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener.
    ///
    /// The returned [`Subscription`] removes the listener when explicitly
    /// unsubscribed; dropping it leaves the listener registered.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let key = {
            let mut registry = self.inner.lock();
            let key = registry.next_key;
            registry.next_key += 1;
            registry.entries.push((key, Arc::new(listener)));
            key
        };

        let registry = Arc::downgrade(&self.inner);
        Subscription {
            cancel: Box::new(move || {
                if let Some(registry) = registry.upgrade() {
                    registry.lock().entries.retain(|(k, _)| *k != key);
                }
            }),
        }
    }

    /// Deliver an event to every listener, in registration order.
    ///
    /// The listener list is snapshotted before invocation, so listeners may
    /// re-enter the registry without deadlocking. Listeners added during
    /// delivery see only later events.
    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in snapshot {
            callback(event);
        }
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`Listeners::subscribe`].
pub struct Subscription {
    cancel: Box<dyn FnOnce() + Send>,
}

impl Subscription {
    /// Remove the listener from its registry.
    pub fn unsubscribe(self) {
        (self.cancel)();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Subscription")
    }
}
