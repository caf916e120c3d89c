//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. These primitives form the dependency graph every container in
//! this crate is built from.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (a computed or effect), the signal automatically
//! registers that context as a dependent. When the signal's value changes, all
//! dependents are invalidated. A signal can also be bound to another signal or
//! to a computed, in which case it mirrors that upstream value.
//!
//! ## Computeds
//!
//! A Computed is a derived value that caches its result. It re-evaluates only
//! when read after one of its dependencies changed.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs immediately and again
//! whenever its dependencies change.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local tracking context to automatically
//! detect dependencies. When a source is read, we check if there is an active
//! tracking context and, if so, subscribe the running computation to it.
//! Writes mark subscribers dirty (push); computeds recompute on read (pull).

mod computed;
mod context;
mod effect;
mod readable;
mod runtime;
mod signal;
mod subscriber;

pub use computed::Computed;
pub use context::{untracked, ReactiveContext};
pub use effect::Effect;
pub use readable::{Readable, StateValue, Writable};
pub use runtime::{Dependency, Observable, Reactive, Runtime, MAX_FLUSH_RUNS};
pub use signal::{Signal, Upstream};
pub use subscriber::{DirtyState, SourceId, SubscriberId, Subscribers};

/// Run `f` as one logical update.
///
/// Writes inside `f` are stored immediately, but effects they invalidate run
/// once, after the outermost batch returns. Nested batches are absorbed.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    Runtime::batch(f)
}
