//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: computeds
//! and effects. A source is anything a subscriber can read from: signals and
//! computeds. This module holds the identifiers for both sides and the
//! ordered subscriber list every source owns.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

use super::runtime::Reactive;

/// Unique identifier for a subscriber.
///
/// Each subscriber (computed or effect) gets a unique ID when created. This ID
/// is used to deduplicate subscriptions and to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a source (signal or computed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Dirty state of a computed or effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirtyState {
    /// The cached value (or last run) is up-to-date.
    Clean,

    /// An upstream computed was invalidated. Its value may or may not have
    /// changed; dependencies must be refreshed and their versions compared.
    MaybeDirty,

    /// A direct dependency changed. Must recompute.
    Dirty,
}

impl DirtyState {
    /// Merge an incoming invalidation into the current state.
    ///
    /// Returns the new state. `Dirty` is never downgraded.
    pub fn escalate(self, incoming: DirtyState) -> DirtyState {
        match (self, incoming) {
            (DirtyState::Dirty, _) | (_, DirtyState::Dirty) => DirtyState::Dirty,
            (DirtyState::MaybeDirty, _) | (_, DirtyState::MaybeDirty) => DirtyState::MaybeDirty,
            _ => DirtyState::Clean,
        }
    }
}

/// The ordered set of subscribers owned by a source.
///
/// Entries are weak so that a source never keeps its readers alive. Order is
/// the order of first subscription; re-subscribing an existing entry keeps
/// its position.
#[derive(Default)]
pub struct Subscribers {
    entries: Mutex<IndexMap<SubscriberId, Weak<dyn Reactive>>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber. Returns `false` if it was already present.
    pub fn add(&self, id: SubscriberId, subscriber: Weak<dyn Reactive>) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&id) {
            return false;
        }
        entries.insert(id, subscriber);
        true
    }

    /// Remove a subscriber, preserving the order of the rest.
    pub fn remove(&self, id: SubscriberId) -> bool {
        self.entries.lock().shift_remove(&id).is_some()
    }

    pub fn contains(&self, id: SubscriberId) -> bool {
        self.entries.lock().contains_key(&id)
    }

    /// Upgrade every live subscriber, pruning the dead ones.
    ///
    /// The lock is released before the caller touches the returned list, so
    /// subscribers may freely (un)subscribe while being notified.
    pub fn snapshot(&self) -> Vec<Arc<dyn Reactive>> {
        let mut entries = self.entries.lock();
        let mut live = Vec::with_capacity(entries.len());
        entries.retain(|_, weak| match weak.upgrade() {
            Some(subscriber) => {
                live.push(subscriber);
                true
            }
            None => false,
        });
        live
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("len", &self.len())
            .finish()
    }
}
