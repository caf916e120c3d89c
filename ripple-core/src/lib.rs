//! Ripple Core
//!
//! This crate provides a fine-grained reactive state engine.
//! It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Signal bindings (two-way to signals, one-way from computeds)
//! - Event channels
//! - State containers (reconciled arrays, named-field composites)
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `collections`: Arrays and composites built from the primitives
//! - `emitter`: Publish/subscribe channels outside the dependency graph
//! - `error`: Errors returned by fallible container operations
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{batch, cell, derive, react};
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use std::sync::Arc;
//!
//! // Create a signal
//! let count = cell(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     derive(move || count.get() * 2)
//! };
//!
//! // Create an effect
//! let seen = Arc::new(AtomicI32::new(0));
//! let effect = {
//!     let (doubled, seen) = (doubled.clone(), seen.clone());
//!     react(move || seen.store(doubled.get(), Ordering::SeqCst))
//! };
//!
//! // Update the signal; the effect runs once per batch
//! batch(|| {
//!     count.set(4);
//!     count.set(5);
//! });
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//! effect.dispose();
//! ```

pub mod collections;
pub mod emitter;
pub mod error;
pub mod reactive;

pub use collections::{Field, KeyFn, Reconcile, StateArray, StateObject};
pub use emitter::{Emitter, Subscription};
pub use error::{Result, StateError};
pub use reactive::{
    batch, untracked, Computed, Effect, Readable, Signal, StateValue, Upstream, Writable,
};

/// Create a signal holding `initial`.
pub fn cell<T: StateValue>(initial: T) -> Signal<T> {
    Signal::new(initial)
}

/// Create a lazily evaluated, cached derivation.
pub fn derive<T, F>(compute: F) -> Computed<T>
where
    T: StateValue,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(compute)
}

/// Create an effect. It runs once now and again after its dependencies
/// change, until disposed.
pub fn react<F>(run: F) -> Effect
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(run)
}

/// Create an event channel with no listeners.
pub fn channel<T: 'static>() -> Emitter<T> {
    Emitter::new()
}

/// Create an event channel with `on_event` already subscribed.
///
/// See [`Emitter::with_handler`].
pub fn channel_with<T, F>(on_event: F) -> Emitter<T>
where
    T: 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    Emitter::with_handler(on_event)
}

/// Create an empty positional array whose slots come from `factory`.
pub fn collection<T, S, F>(factory: F) -> StateArray<T, S>
where
    T: StateValue,
    S: Writable<T> + StateValue,
    F: Fn() -> S + Send + Sync + 'static,
{
    StateArray::new(factory)
}

/// Create a composite from named fields.
pub fn composite<I, K>(fields: I) -> StateObject
where
    I: IntoIterator<Item = (K, Field)>,
    K: Into<String>,
{
    StateObject::new(fields)
}
