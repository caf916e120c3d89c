//! Event Channel
//!
//! An [`Emitter`] is a plain publish/subscribe list. It is deliberately not
//! part of the dependency graph: emitting never invalidates a computed or
//! effect, and nothing is stored between emissions.
//!
//! Delivery order is subscription order. A listener added while an emission
//! is in progress does not receive that emission, and a listener removed
//! while it is in progress receives nothing further.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// An ordered list of callbacks fed by [`Emitter::emit`].
///
/// Cloning yields another handle to the same listener list.
pub struct Emitter<T: 'static> {
    inner: Arc<EmitterInner<T>>,
}

struct EmitterInner<T: 'static> {
    listeners: Mutex<IndexMap<u64, Listener<T>>>,
    next_id: AtomicU64,
}

/// Handle returned by [`Emitter::subscribe`].
///
/// Dropping it leaves the listener subscribed; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription<T: 'static> {
    emitter: Weak<EmitterInner<T>>,
    id: u64,
}

impl<T: 'static> Emitter<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                listeners: Mutex::new(IndexMap::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Create an emitter with one listener already attached.
    pub fn with_handler<F>(on_event: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let emitter = Self::new();
        // The handler lives as long as the emitter.
        let _ = emitter.subscribe(on_event);
        emitter
    }

    /// Add a listener at the end of the delivery order.
    pub fn subscribe<F>(&self, listener: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().insert(id, Arc::new(listener));
        Subscription {
            emitter: Arc::downgrade(&self.inner),
            id,
        }
    }

    /// Deliver `value` to every current listener, in subscription order.
    pub fn emit(&self, value: &T) {
        let listeners: Vec<(u64, Listener<T>)> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in listeners {
            // An earlier listener may have unsubscribed this one.
            if self.inner.listeners.lock().contains_key(&id) {
                listener(value);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Remove every listener.
    pub fn clear(&self) {
        self.inner.listeners.lock().clear();
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: 'static> Subscription<T> {
    /// Remove the listener. Idempotent; returns whether it was still
    /// subscribed.
    pub fn unsubscribe(&self) -> bool {
        match self.emitter.upgrade() {
            Some(inner) => inner.listeners.lock().shift_remove(&self.id).is_some(),
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.emitter
            .upgrade()
            .is_some_and(|inner| inner.listeners.lock().contains_key(&self.id))
    }
}

impl<T: 'static> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: 'static> PartialEq for Emitter<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: 'static> std::fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listener_count", &self.listener_count())
            .finish()
    }
}

impl<T: 'static> std::fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
