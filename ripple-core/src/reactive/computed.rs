//! Computed Implementation
//!
//! A Computed is a cached derived value that re-evaluates only when its
//! dependencies change.
//!
//! # How Computeds Work
//!
//! 1. Construction stores the function. Nothing runs yet.
//!
//! 2. On first access, the computed runs its function inside a tracking
//!    context, caches the result and subscribes to every source it read.
//!
//! 3. When a source signal changes, the computed is marked `Dirty` and its
//!    own subscribers are marked `MaybeDirty`. Nothing is recomputed.
//!
//! 4. On next access, a `Dirty` computed recomputes. A `MaybeDirty` one
//!    refreshes its dependencies first and recomputes only if one of their
//!    versions moved.
//!
//! 5. A recompute that yields an equal value keeps the version, so readers
//!    further downstream can skip their own work.
//!
//! Reads made with `peek()` inside the function are not dependencies: the
//! computed will not notice when those values change.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use super::context::ReactiveContext;
use super::readable::{Readable, StateValue};
use super::runtime::{any_stale, release_stale, Dependencies, Observable, Reactive, Runtime};
use super::subscriber::{DirtyState, SourceId, SubscriberId, Subscribers};

/// A cached derived value that recomputes lazily when dependencies change.
///
/// Cloning yields another handle to the same cache.
pub struct Computed<T: StateValue> {
    inner: Arc<ComputedInner<T>>,
}

struct ComputedInner<T: StateValue> {
    id: SourceId,

    /// The subscriber ID used for dependency tracking.
    subscriber_id: SubscriberId,

    compute: Box<dyn Fn() -> T + Send + Sync>,

    /// The cached value (None if never computed).
    value: RwLock<Option<T>>,

    state: Mutex<DirtyState>,

    /// Bumped whenever a recompute produces a different value.
    version: AtomicU64,

    /// Sources read during the last run.
    dependencies: Mutex<Dependencies>,

    subscribers: Subscribers,

    recompute_count: AtomicUsize,

    this: Weak<ComputedInner<T>>,
}

impl<T: StateValue> Computed<T> {
    /// Create a new computed with the given function.
    ///
    /// The function is not run until the first read.
    pub fn new<F>(compute: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new_cyclic(|this| ComputedInner {
                id: SourceId::new(),
                subscriber_id: SubscriberId::new(),
                compute: Box::new(compute),
                value: RwLock::new(None),
                state: Mutex::new(DirtyState::Dirty),
                version: AtomicU64::new(0),
                dependencies: Mutex::new(Dependencies::new()),
                subscribers: Subscribers::new(),
                recompute_count: AtomicUsize::new(0),
                this: this.clone(),
            }),
        }
    }

    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Get the current value, recomputing if necessary.
    ///
    /// Registers this computed as a dependency of the running computation.
    pub fn get(&self) -> T {
        let value = self.inner.current();
        if ReactiveContext::is_tracking() {
            let source: Arc<dyn Observable> = self.inner.clone();
            ReactiveContext::track(&source);
        }
        value
    }

    /// Get the current value, recomputing if necessary, without tracking.
    pub fn peek(&self) -> T {
        self.inner.current()
    }

    /// Force the next read to recompute.
    ///
    /// Useful when the function reads something outside the graph, or reads
    /// a source with `peek()`.
    pub fn invalidate(&self) {
        Arc::clone(&self.inner).mark(DirtyState::Dirty);
        Runtime::flush();
    }

    /// Get the current dirty state.
    pub fn state(&self) -> DirtyState {
        *self.inner.state.lock()
    }

    /// Check if the computed has a cached value.
    pub fn has_value(&self) -> bool {
        self.inner.value.read().is_some()
    }

    /// Number of times the function has run.
    pub fn recompute_count(&self) -> usize {
        self.inner.recompute_count.load(Ordering::SeqCst)
    }

    pub fn version(&self) -> u64 {
        self.inner.version.load(Ordering::SeqCst)
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.len()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: StateValue> ComputedInner<T> {
    fn current(&self) -> T {
        self.refresh_value();
        if let Some(value) = self.value.read().as_ref() {
            return value.clone();
        }
        self.recompute()
    }

    fn refresh_value(&self) {
        let state = *self.state.lock();
        match state {
            DirtyState::Clean => {}
            DirtyState::Dirty => {
                self.recompute();
            }
            DirtyState::MaybeDirty => {
                let dependencies = self.dependencies.lock().clone();
                if any_stale(&dependencies) {
                    self.recompute();
                    return;
                }
                // The check can re-enter and escalate us to Dirty.
                let escalated = {
                    let mut state = self.state.lock();
                    let escalated = *state == DirtyState::Dirty;
                    if !escalated {
                        *state = DirtyState::Clean;
                    }
                    escalated
                };
                if escalated {
                    self.recompute();
                }
            }
        }
    }

    /// Run the function and cache the result.
    ///
    /// The state is cleared before running, so an invalidation that arrives
    /// while the function runs leaves the computed dirty.
    fn recompute(&self) -> T {
        *self.state.lock() = DirtyState::Clean;

        let (new_value, dependencies) = {
            let subscriber: Weak<dyn Reactive> = self.this.clone();
            let ctx = ReactiveContext::enter(self.subscriber_id, subscriber);
            let value = (self.compute)();
            (value, ctx.take_dependencies())
        };

        let previous = std::mem::take(&mut *self.dependencies.lock());
        release_stale(self.subscriber_id, &previous, &dependencies);
        *self.dependencies.lock() = dependencies;

        let changed = {
            let mut slot = self.value.write();
            let changed = slot.as_ref() != Some(&new_value);
            if changed {
                *slot = Some(new_value.clone());
            }
            changed
        };
        if changed {
            self.version.fetch_add(1, Ordering::SeqCst);
        }
        let runs = self.recompute_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(computed = ?self.id, runs, changed, "recomputed");

        new_value
    }
}

impl<T: StateValue> Reactive for ComputedInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark(self: Arc<Self>, incoming: DirtyState) {
        let was_clean = {
            let mut state = self.state.lock();
            let was_clean = *state == DirtyState::Clean;
            *state = state.escalate(incoming);
            was_clean
        };
        if was_clean {
            Runtime::propagate(&self.subscribers, DirtyState::MaybeDirty);
        }
    }

    fn is_eager(&self) -> bool {
        false
    }

    fn run_if_stale(self: Arc<Self>) {
        self.refresh_value();
    }
}

impl<T: StateValue> Observable for ComputedInner<T> {
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn refresh(&self) {
        self.refresh_value();
    }

    fn subscribers(&self) -> &Subscribers {
        &self.subscribers
    }
}

impl<T: StateValue> Readable<T> for Computed<T> {
    fn get(&self) -> T {
        Computed::get(self)
    }

    fn peek(&self) -> T {
        Computed::peek(self)
    }
}

impl<T: StateValue> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: StateValue> PartialEq for Computed<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<T: StateValue> Eq for Computed<T> {}

impl<T> Debug for Computed<T>
where
    T: StateValue + Debug,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("value", &*self.inner.value.read())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Signal};
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn computed_is_inert_until_read() {
        let call_count = Arc::new(AtomicI32::new(0));
        let call_count_clone = call_count.clone();

        let computed = Computed::new(move || {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
            42
        });

        assert!(!computed.has_value());
        assert_eq!(call_count.load(Ordering::SeqCst), 0);

        assert_eq!(computed.get(), 42);
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
        assert!(computed.has_value());
    }

    #[test]
    fn computed_caches_value_when_clean() {
        let computed = Computed::new(|| 42);

        assert_eq!(computed.get(), 42);
        assert_eq!(computed.peek(), 42);
        assert_eq!(computed.get(), 42);
        assert_eq!(computed.recompute_count(), 1);
    }

    #[test]
    fn invalidation_is_lazy() {
        let source = Signal::new(1);
        let computed = {
            let source = source.clone();
            Computed::new(move || source.get() + 1)
        };

        assert_eq!(computed.get(), 2);
        source.set(5);
        source.set(6);

        // Marked, not recomputed.
        assert_eq!(computed.state(), DirtyState::Dirty);
        assert_eq!(computed.recompute_count(), 1);

        assert_eq!(computed.get(), 7);
        assert_eq!(computed.recompute_count(), 2);
        assert_eq!(computed.state(), DirtyState::Clean);
    }

    #[test]
    fn peeked_source_is_not_a_dependency() {
        let source = Signal::new(1);
        let computed = {
            let source = source.clone();
            Computed::new(move || source.peek() * 10)
        };

        assert_eq!(computed.get(), 10);
        assert_eq!(computed.dependency_count(), 0);

        source.set(2);
        assert_eq!(computed.get(), 10);
        assert_eq!(computed.recompute_count(), 1);

        computed.invalidate();
        assert_eq!(computed.get(), 20);
    }

    #[test]
    fn dependencies_follow_control_flow() {
        let flag = Signal::new(true);
        let left = Signal::new("left");
        let right = Signal::new("right");

        let computed = {
            let (flag, left, right) = (flag.clone(), left.clone(), right.clone());
            Computed::new(move || if flag.get() { left.get() } else { right.get() })
        };

        assert_eq!(computed.get(), "left");
        assert_eq!(left.subscriber_count(), 1);
        assert_eq!(right.subscriber_count(), 0);

        flag.set(false);
        assert_eq!(computed.get(), "right");
        assert_eq!(left.subscriber_count(), 0);
        assert_eq!(right.subscriber_count(), 1);

        left.set("ignored");
        assert_eq!(computed.state(), DirtyState::Clean);
    }

    #[test]
    fn computed_depends_on_computed() {
        let base = Signal::new(5);
        let doubled = {
            let base = base.clone();
            Computed::new(move || base.get() * 2)
        };
        let plus_ten = {
            let doubled = doubled.clone();
            Computed::new(move || doubled.get() + 10)
        };

        assert_eq!(plus_ten.get(), 20);

        base.set(10);
        assert_eq!(doubled.state(), DirtyState::Dirty);
        assert_eq!(plus_ten.state(), DirtyState::MaybeDirty);
        assert_eq!(plus_ten.get(), 30);
    }

    #[test]
    fn equal_upstream_result_skips_downstream_recompute() {
        let base = Signal::new(3);
        let parity = {
            let base = base.clone();
            Computed::new(move || base.get() % 2)
        };
        let label = {
            let parity = parity.clone();
            Computed::new(move || if parity.get() == 0 { "even" } else { "odd" })
        };

        assert_eq!(label.get(), "odd");
        base.set(5);
        assert_eq!(label.get(), "odd");

        assert_eq!(parity.recompute_count(), 2);
        assert_eq!(label.recompute_count(), 1);
    }

    #[test]
    fn effect_over_computed_skips_when_value_unchanged() {
        let base = Signal::new(2);
        let parity = {
            let base = base.clone();
            Computed::new(move || base.get() % 2)
        };
        let runs = Arc::new(AtomicI32::new(0));
        let _effect = {
            let (parity, runs) = (parity.clone(), runs.clone());
            Effect::new(move || {
                parity.get();
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        base.set(4);
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        base.set(5);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn computed_clone_shares_state() {
        let computed1 = Computed::new(|| 42);
        assert_eq!(computed1.get(), 42);

        let computed2 = computed1.clone();
        assert_eq!(computed1.id(), computed2.id());
        assert!(computed2.has_value());
        assert_eq!(computed1, computed2);

        computed1.invalidate();
        assert_eq!(computed2.state(), DirtyState::Dirty);
    }
}
