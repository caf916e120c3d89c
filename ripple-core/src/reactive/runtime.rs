//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, computeds,
//! and effects. It owns the queue of effects waiting to run, the batch depth,
//! and the registry that keeps live effects alive.
//!
//! # How It Works
//!
//! 1. When a computed or effect reads a source, the tracking context records
//!    the dependency and subscribes the reader to the source.
//!
//! 2. When a signal's value changes, the runtime:
//!    a. Marks its direct subscribers `Dirty`
//!    b. Computeds propagate `MaybeDirty` to their own subscribers
//!    c. Effects that leave the `Clean` state are queued
//!    d. Computeds stay lazy - they recompute on next access
//!
//! 3. Once marking is complete and no batch is open, the queue is flushed in
//!    FIFO order. Effects invalidated during the flush join the same pass.
//!
//! # Thread Safety
//!
//! Handles are `Send + Sync`, but the queue and batch depth are thread-local:
//! a graph is driven synchronously from whichever thread writes to it. The
//! effect registry is global and keyed by unique subscriber IDs.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::RwLock;
use smallvec::SmallVec;

use super::subscriber::{DirtyState, SourceId, SubscriberId, Subscribers};

/// Upper bound on effect runs in a single flush.
///
/// Exceeding it means some reaction keeps re-triggering itself.
pub const MAX_FLUSH_RUNS: usize = 100_000;

/// A computation that can be notified when its dependencies change.
pub trait Reactive: Send + Sync {
    /// Get the subscriber ID for this reactive value.
    fn subscriber_id(&self) -> SubscriberId;

    /// Record an invalidation. Effects leaving the clean state enqueue
    /// themselves; computeds forward `MaybeDirty` downstream.
    fn mark(self: Arc<Self>, state: DirtyState);

    /// Check if this reactive value is an effect (eager) or computed (lazy).
    fn is_eager(&self) -> bool;

    /// Bring the computation up to date if it is stale.
    fn run_if_stale(self: Arc<Self>);
}

/// Something a computation can depend on.
pub trait Observable: Send + Sync {
    fn source_id(&self) -> SourceId;

    /// Monotonic counter bumped every time the observed value changes.
    fn version(&self) -> u64;

    /// Bring the value up to date. A no-op for signals.
    fn refresh(&self);

    fn subscribers(&self) -> &Subscribers;
}

/// A source read during a run, with the version observed at read time.
///
/// The source is held weakly: reading a value does not keep it alive. A
/// dropped source can no longer change, so it is never stale.
#[derive(Clone)]
pub struct Dependency {
    pub id: SourceId,
    pub source: Weak<dyn Observable>,
    pub version: u64,
}

impl Dependency {
    pub fn new(source: &Arc<dyn Observable>) -> Self {
        Self {
            id: source.source_id(),
            source: Arc::downgrade(source),
            version: source.version(),
        }
    }

    /// Whether the source changed since it was read.
    ///
    /// Refreshes the source first so computeds settle before comparing.
    pub fn is_stale(&self) -> bool {
        match self.source.upgrade() {
            Some(source) => {
                source.refresh();
                source.version() != self.version
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependency")
            .field("source", &self.id)
            .field("version", &self.version)
            .field("alive", &(self.source.strong_count() > 0))
            .finish()
    }
}

pub type Dependencies = SmallVec<[Dependency; 4]>;

/// Unsubscribe `id` from every source in `previous` that is absent from
/// `current`. Shared sources keep their subscription and its position.
pub(crate) fn release_stale(id: SubscriberId, previous: &[Dependency], current: &[Dependency]) {
    for old in previous {
        if current.iter().any(|dep| dep.id == old.id) {
            continue;
        }
        if let Some(source) = old.source.upgrade() {
            source.subscribers().remove(id);
        }
    }
}

/// Whether any dependency changed since it was read.
pub(crate) fn any_stale(dependencies: &[Dependency]) -> bool {
    dependencies.iter().any(Dependency::is_stale)
}

/// The reactive runtime.
pub struct Runtime;

#[derive(Default)]
struct RuntimeState {
    batch_depth: usize,
    flushing: bool,
    pending: VecDeque<Arc<dyn Reactive>>,
}

thread_local! {
    static STATE: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());
}

// Live effects, keyed by subscriber ID. Sources only hold weak references to
// their subscribers, so this is what keeps an effect running until disposed.
static REGISTRY: OnceLock<RwLock<HashMap<SubscriberId, Arc<dyn Reactive>>>> = OnceLock::new();

fn get_registry() -> &'static RwLock<HashMap<SubscriberId, Arc<dyn Reactive>>> {
    REGISTRY.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Decrements the batch depth when dropped, so a panicking batch body does
/// not leave the thread stuck in batching mode.
struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        STATE.with(|state| {
            let mut state = state.borrow_mut();
            state.batch_depth = state.batch_depth.saturating_sub(1);
        });
    }
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        STATE.with(|state| state.borrow_mut().flushing = false);
    }
}

impl Runtime {
    /// Keep a reactive value alive until [`Runtime::unregister`].
    pub fn register(reactive: Arc<dyn Reactive>) {
        let id = reactive.subscriber_id();
        get_registry().write().insert(id, reactive);
    }

    /// Release a reactive value. Returns `false` if it was not registered.
    pub fn unregister(id: SubscriberId) -> bool {
        // Dropped after the lock is released: the effect's closure may own
        // signals whose bindings unregister their own effects.
        let removed = get_registry().write().remove(&id);
        removed.is_some()
    }

    pub fn is_registered(id: SubscriberId) -> bool {
        get_registry().read().contains_key(&id)
    }

    /// A source changed: invalidate its subscribers and flush if idle.
    ///
    /// This is the core update propagation mechanism.
    pub fn notify(subscribers: &Subscribers) {
        Self::propagate(subscribers, DirtyState::Dirty);
        Self::flush();
    }

    /// Mark every subscriber with `state` without flushing.
    pub(crate) fn propagate(subscribers: &Subscribers, state: DirtyState) {
        for subscriber in subscribers.snapshot() {
            subscriber.mark(state);
        }
    }

    /// Queue an effect for the next flush.
    pub(crate) fn enqueue(reactive: Arc<dyn Reactive>) {
        STATE.with(|state| state.borrow_mut().pending.push_back(reactive));
    }

    /// Run `f` with effect execution deferred until the outermost batch ends.
    pub fn batch<R>(f: impl FnOnce() -> R) -> R {
        STATE.with(|state| state.borrow_mut().batch_depth += 1);
        let result = {
            let _guard = BatchGuard;
            f()
        };
        Self::flush();
        result
    }

    pub fn is_batching() -> bool {
        STATE.with(|state| state.borrow().batch_depth > 0)
    }

    /// Number of effects waiting for the next flush on this thread.
    pub fn pending_count() -> usize {
        STATE.with(|state| state.borrow().pending.len())
    }

    /// Run every pending effect, unless a batch is open or a flush is
    /// already running further up the stack.
    pub fn flush() {
        let start = STATE.with(|state| {
            let mut state = state.borrow_mut();
            if state.flushing || state.batch_depth > 0 || state.pending.is_empty() {
                return false;
            }
            state.flushing = true;
            true
        });
        if !start {
            return;
        }
        let _guard = FlushGuard;

        let mut runs = 0usize;
        while let Some(next) = STATE.with(|state| state.borrow_mut().pending.pop_front()) {
            runs += 1;
            if runs > MAX_FLUSH_RUNS {
                STATE.with(|state| state.borrow_mut().pending.clear());
                tracing::error!(runs, "effect flush did not settle");
                panic!(
                    "reactive flush exceeded {MAX_FLUSH_RUNS} effect runs; \
                     an effect is re-triggering itself"
                );
            }
            next.run_if_stale();
        }
        tracing::trace!(runs, "flush complete");
    }

    /// Check if we're inside a tracking context.
    pub fn is_tracking() -> bool {
        super::context::ReactiveContext::is_tracking()
    }
}
