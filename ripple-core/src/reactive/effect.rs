//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect is queued and re-run in full
//!    once the current write (or batch) completes.
//!
//! 3. Every run re-collects dependencies, so the set can change with the
//!    function's own control flow. Sources no longer read are released.
//!
//! # Differences from Computed
//!
//! - Computeds return a value; effects do not.
//! - Computeds are lazy (compute on access); effects are eager.
//! - Effects are the only thing that pulls the graph.
//!
//! # Lifetime
//!
//! The runtime keeps a live effect registered until [`Effect::dispose`] is
//! called. Dropping the handle does not stop it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::context::ReactiveContext;
use super::runtime::{any_stale, release_stale, Dependencies, Reactive, Runtime};
use super::subscriber::{DirtyState, SubscriberId};

/// A side-effecting computation that runs when dependencies change.
///
/// The handle doubles as the effect's disposer.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Effect, Signal};
///
/// let count = Signal::new(0);
/// let effect = {
///     let count = count.clone();
///     Effect::new(move || println!("Count is: {}", count.get()))
/// };
///
/// count.set(5); // Prints: "Count is: 5"
/// effect.dispose();
/// ```
#[derive(Clone)]
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    subscriber_id: SubscriberId,

    run: Box<dyn Fn() + Send + Sync>,

    state: Mutex<DirtyState>,

    /// Sources read during the last run.
    dependencies: Mutex<Dependencies>,

    disposed: AtomicBool,

    run_count: AtomicUsize,

    this: Weak<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|this| EffectInner {
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            state: Mutex::new(DirtyState::Dirty),
            dependencies: Mutex::new(Dependencies::new()),
            disposed: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            this: this.clone(),
        });
        Runtime::register(inner.clone());
        inner.execute();
        Self { inner }
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Run the effect function now, whatever its dirty state.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Dispose of the effect.
    ///
    /// After disposal the effect never runs again and is removed from every
    /// dependency's subscriber set. Calling this more than once is harmless.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Get the number of times the effect has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.dependencies.lock().len()
    }
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }

        *self.state.lock() = DirtyState::Clean;

        let dependencies = {
            let subscriber: Weak<dyn Reactive> = self.this.clone();
            let ctx = ReactiveContext::enter(self.subscriber_id, subscriber);
            (self.run)();
            ctx.take_dependencies()
        };

        let previous = std::mem::take(&mut *self.dependencies.lock());
        if self.disposed.load(Ordering::SeqCst) {
            // Disposed from inside its own run.
            release_stale(self.subscriber_id, &previous, &[]);
            release_stale(self.subscriber_id, &dependencies, &[]);
            return;
        }
        release_stale(self.subscriber_id, &previous, &dependencies);
        *self.dependencies.lock() = dependencies;

        let runs = self.run_count.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::trace!(effect = ?self.subscriber_id, runs, "effect ran");
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        let dependencies = std::mem::take(&mut *self.dependencies.lock());
        release_stale(self.subscriber_id, &dependencies, &[]);
        Runtime::unregister(self.subscriber_id);
        tracing::debug!(effect = ?self.subscriber_id, "effect disposed");
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn mark(self: Arc<Self>, incoming: DirtyState) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let was_clean = {
            let mut state = self.state.lock();
            let was_clean = *state == DirtyState::Clean;
            *state = state.escalate(incoming);
            was_clean
        };
        if was_clean {
            Runtime::enqueue(self);
        }
    }

    fn is_eager(&self) -> bool {
        true
    }

    fn run_if_stale(self: Arc<Self>) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let state = *self.state.lock();
        match state {
            DirtyState::Clean => {}
            DirtyState::Dirty => self.execute(),
            DirtyState::MaybeDirty => {
                let dependencies = self.dependencies.lock().clone();
                if any_stale(&dependencies) {
                    self.execute();
                    return;
                }
                let escalated = {
                    let mut state = self.state.lock();
                    let escalated = *state == DirtyState::Dirty;
                    if !escalated {
                        *state = DirtyState::Clean;
                    }
                    escalated
                };
                if escalated {
                    self.execute();
                }
            }
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.subscriber_id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
