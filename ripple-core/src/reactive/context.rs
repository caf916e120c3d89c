//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a source is read,
//! the current computation is subscribed to it.
//!
//! # Implementation
//!
//! We use a thread-local stack. Running a computed or effect pushes a
//! tracking entry; `untracked` pushes an entry with no subscriber, which
//! shadows any tracking entry beneath it. Nested contexts (a computed read
//! from inside an effect) each collect their own dependencies.

use std::cell::RefCell;
use std::sync::{Arc, Weak};

use super::runtime::{Dependencies, Dependency, Observable, Reactive};
use super::SubscriberId;

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = RefCell::new(Vec::new());
}

/// The computation a tracking entry collects dependencies for.
struct Tracker {
    subscriber_id: SubscriberId,
    subscriber: Weak<dyn Reactive>,
}

/// An entry in the reactive context stack.
struct ContextEntry {
    /// `None` for an untracked scope.
    tracker: Option<Tracker>,
    /// Sources read during this computation, deduplicated, in read order.
    dependencies: Dependencies,
}

/// Guard that pops the context when dropped.
///
/// This keeps the stack balanced even if the computation panics.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a tracking context for the given subscriber.
    ///
    /// While this context is active, any source read with `get()` records
    /// a dependency and subscribes `subscriber` to it.
    pub fn enter(subscriber_id: SubscriberId, subscriber: Weak<dyn Reactive>) -> Self {
        Self::push(Some(Tracker {
            subscriber_id,
            subscriber,
        }));
        Self {
            subscriber_id: Some(subscriber_id),
        }
    }

    /// Enter a scope in which no reads are tracked.
    pub fn untracked() -> Self {
        Self::push(None);
        Self { subscriber_id: None }
    }

    fn push(tracker: Option<Tracker>) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                tracker,
                dependencies: Dependencies::new(),
            });
        });
    }

    /// Check if reads are currently being tracked.
    pub fn is_tracking() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.tracker.is_some())
        })
    }

    /// Get the current subscriber ID, if reads are being tracked.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.tracker.as_ref())
                .map(|tracker| tracker.subscriber_id)
        })
    }

    /// Record a read of `source` in the current context.
    ///
    /// Called by signals and computeds from `get()`. The first read of a
    /// source in a run stores the version seen and subscribes the running
    /// computation; repeated reads are ignored.
    pub fn track(source: &Arc<dyn Observable>) {
        let id = source.source_id();
        let subscription = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            let entry = stack.last_mut()?;
            let tracker = entry.tracker.as_ref()?;
            if entry
                .dependencies
                .iter()
                .any(|dep| dep.id == id)
            {
                return None;
            }
            let subscription = (tracker.subscriber_id, tracker.subscriber.clone());
            entry.dependencies.push(Dependency::new(source));
            Some(subscription)
        });

        if let Some((subscriber_id, subscriber)) = subscription {
            source.subscribers().add(subscriber_id, subscriber);
        }
    }

    /// Take the dependencies collected so far in this context.
    pub fn take_dependencies(&self) -> Dependencies {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.dependencies))
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.tracker.as_ref().map(|t| t.subscriber_id),
                    self.subscriber_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

/// Run `f` without registering any dependency, whatever the context.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _ctx = ReactiveContext::untracked();
    f()
}
