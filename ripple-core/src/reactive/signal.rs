//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read with `get()` within a computed or effect, the
//!    signal registers that computation as a subscriber.
//!
//! 2. When `set()` stores a value that differs from the current one, the
//!    version is bumped and all subscribers are invalidated.
//!
//! 3. Invalidated effects re-run; invalidated computeds recompute lazily.
//!
//! # Bindings
//!
//! Instead of a plain value, a signal can be bound to an [`Upstream`]:
//!
//! - another signal: two effects mirror values both ways
//! - a computed: one effect mirrors the computed into this signal
//!
//! A signal has at most one binding. Binding again disposes the previous
//! link before wiring the new one, and bindings that would close a loop of
//! signal-to-signal mirrors are rejected. The mirrors only hold the bound
//! signal weakly, so dropping its last handle disposes the binding.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use smallvec::{smallvec, SmallVec};

use super::computed::Computed;
use super::context::ReactiveContext;
use super::effect::Effect;
use super::readable::{Readable, StateValue, Writable};
use super::runtime::{Observable, Runtime};
use super::subscriber::{SourceId, Subscribers};
use crate::error::{Result, StateError};

/// A reactive signal holding a value of type T.
///
/// Cloning a signal yields another handle to the same state; handles compare
/// equal only when they share that state.
///
/// # Example
///
/// ```rust
/// use ripple_core::Signal;
///
/// let count = Signal::new(0);
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct Signal<T: StateValue> {
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T: StateValue> {
    id: SourceId,

    value: RwLock<T>,

    /// Bumped on every change that notified subscribers.
    version: AtomicU64,

    subscribers: Subscribers,

    binding: Mutex<Option<ActiveBinding<T>>>,
}

/// What a signal can be bound to.
pub enum Upstream<T: StateValue> {
    /// Mirror both ways.
    Writable(Signal<T>),
    /// Mirror from the computed only.
    Derived(Computed<T>),
}

impl<T: StateValue> From<Signal<T>> for Upstream<T> {
    fn from(signal: Signal<T>) -> Self {
        Upstream::Writable(signal)
    }
}

impl<T: StateValue> From<&Signal<T>> for Upstream<T> {
    fn from(signal: &Signal<T>) -> Self {
        Upstream::Writable(signal.clone())
    }
}

impl<T: StateValue> From<Computed<T>> for Upstream<T> {
    fn from(computed: Computed<T>) -> Self {
        Upstream::Derived(computed)
    }
}

impl<T: StateValue> From<&Computed<T>> for Upstream<T> {
    fn from(computed: &Computed<T>) -> Self {
        Upstream::Derived(computed.clone())
    }
}

impl<T: StateValue> Upstream<T> {
    fn peek(&self) -> T {
        match self {
            Upstream::Writable(signal) => signal.peek(),
            Upstream::Derived(computed) => computed.peek(),
        }
    }
}

/// The effects that keep a bound signal in sync with its upstream.
///
/// Dropping the binding disposes them.
struct ActiveBinding<T: StateValue> {
    /// Set for signal-to-signal bindings, walked for cycle detection.
    upstream: Option<Signal<T>>,
    effects: SmallVec<[Effect; 2]>,
}

impl<T: StateValue> Drop for ActiveBinding<T> {
    fn drop(&mut self) {
        for effect in &self.effects {
            effect.dispose();
        }
    }
}

impl<T: StateValue> Signal<T> {
    /// Create a new signal with the given initial value.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: SourceId::new(),
                value: RwLock::new(value),
                version: AtomicU64::new(0),
                subscribers: Subscribers::new(),
                binding: Mutex::new(None),
            }),
        }
    }

    /// Create a signal already bound to `upstream`.
    ///
    /// The signal starts with the upstream's current value.
    pub fn bound(upstream: impl Into<Upstream<T>>) -> Self {
        let upstream = upstream.into();
        let signal = Self::new(upstream.peek());
        // A fresh signal has no binding chain that could loop back to it.
        signal.bind_unchecked(upstream);
        signal
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called within a computed or effect, this also registers the
    /// current computation as a subscriber.
    pub fn get(&self) -> T {
        if ReactiveContext::is_tracking() {
            let source: Arc<dyn Observable> = self.inner.clone();
            ReactiveContext::track(&source);
        }
        self.inner.value.read().clone()
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Store a new value and notify subscribers if it differs.
    ///
    /// An active binding stays armed: a one-way mirror overwrites this value
    /// the next time its source changes.
    pub fn set(&self, value: T) {
        {
            let mut guard = self.inner.value.write();
            if *guard == value {
                return;
            }
            *guard = value;
        }
        self.inner.version.fetch_add(1, Ordering::SeqCst);
        Runtime::notify(&self.inner.subscribers);
    }

    /// Update the value using a function of the current one.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.peek();
        self.set(f(&current));
    }

    /// Mirror `upstream` into this signal, replacing any existing binding.
    ///
    /// Binding to another signal is bidirectional; binding to a computed is
    /// one-way. When this returns, `get()` already reflects the upstream.
    ///
    /// Fails with [`StateError::BindingCycle`] if `upstream` is, or is bound
    /// through a chain of signals to, this signal. The existing binding is
    /// left in place in that case.
    pub fn bind(&self, upstream: impl Into<Upstream<T>>) -> Result<()> {
        let upstream = upstream.into();
        if let Upstream::Writable(source) = &upstream {
            if self.is_reachable_from(source) {
                return Err(StateError::BindingCycle);
            }
        }
        self.bind_unchecked(upstream);
        Ok(())
    }

    fn bind_unchecked(&self, upstream: Upstream<T>) {
        self.unbind();

        let target = Arc::downgrade(&self.inner);
        let binding = match upstream {
            Upstream::Writable(source) => {
                tracing::debug!(target_id = ?self.id(), source_id = ?source.id(), "binding signal to signal");
                let forward = mirror_into(source.clone(), target.clone());
                let backward = {
                    let source = source.clone();
                    Effect::new(move || {
                        if let Some(inner) = target.upgrade() {
                            source.set(Signal { inner }.get());
                        }
                    })
                };
                ActiveBinding {
                    upstream: Some(source),
                    effects: smallvec![forward, backward],
                }
            }
            Upstream::Derived(computed) => {
                tracing::debug!(target_id = ?self.id(), source_id = ?computed.id(), "binding signal to computed");
                ActiveBinding {
                    upstream: None,
                    effects: smallvec![mirror_into(computed, target)],
                }
            }
        };

        let previous = self.inner.binding.lock().replace(binding);
        drop(previous);
    }

    /// Dispose the active binding. Returns whether there was one.
    pub fn unbind(&self) -> bool {
        let previous = self.inner.binding.lock().take();
        match previous {
            Some(binding) => {
                tracing::debug!(target_id = ?self.id(), "disposing binding");
                drop(binding);
                true
            }
            None => false,
        }
    }

    pub fn is_bound(&self) -> bool {
        self.inner.binding.lock().is_some()
    }

    /// Whether following signal-to-signal bindings from `source` arrives
    /// back at this signal.
    fn is_reachable_from(&self, source: &Signal<T>) -> bool {
        let mut current = Some(source.clone());
        while let Some(signal) = current {
            if signal.ptr_eq(self) {
                return true;
            }
            current = signal.upstream_signal();
        }
        false
    }

    fn upstream_signal(&self) -> Option<Signal<T>> {
        self.inner
            .binding
            .lock()
            .as_ref()
            .and_then(|binding| binding.upstream.clone())
    }

    /// Whether two handles share the same state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of changes stored since creation.
    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }
}

/// An effect that pushes every value of `source` into the target signal.
fn mirror_into<T, R>(source: R, target: Weak<SignalInner<T>>) -> Effect
where
    T: StateValue,
    R: Readable<T> + Send + Sync + 'static,
{
    Effect::new(move || {
        let value = source.get();
        if let Some(inner) = target.upgrade() {
            Signal { inner }.set(value);
        }
    })
}

impl<T: StateValue> Observable for SignalInner<T> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn refresh(&self) {}

    fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }
}

impl<T: StateValue> Readable<T> for Signal<T> {
    fn get(&self) -> T {
        Signal::get(self)
    }

    fn peek(&self) -> T {
        Signal::peek(self)
    }
}

impl<T: StateValue> Writable<T> for Signal<T> {
    fn set(&self, value: T) {
        Signal::set(self, value)
    }
}

impl<T: StateValue> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: StateValue + Default> Default for Signal<T> {
    /// A signal holding the type's empty value.
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: StateValue> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: StateValue> Eq for Signal<T> {}

impl<T> Debug for Signal<T>
where
    T: StateValue + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .field("bound", &self.is_bound())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
