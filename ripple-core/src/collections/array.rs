//! Indexed collection of reactive slots.
//!
//! A [`StateArray`] keeps one slot (by default a [`Signal`]) per element and
//! exposes the plain values through a [`Computed`]. Writing a new sequence
//! reconciles it against the existing slots so that readers holding a slot
//! keep receiving updates for "their" element.
//!
//! # Reconciliation
//!
//! - [`Reconcile::Positional`] (default): the slot at index `i` survives a
//!   `set()` iff index `i` existed before. O(n), no key needed, but reordering
//!   items moves values between slots.
//! - [`Reconcile::Keyed`]: slots follow the key extracted from each item, so
//!   reordering keeps each logical item in its slot. Items whose key was
//!   already used in the same sequence get a fresh slot.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{Result, StateError};
use crate::reactive::{batch, Computed, Readable, Signal, StateValue, Writable};

/// Key extractor for [`Reconcile::Keyed`].
pub type KeyFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// How new values are matched to existing slots.
pub enum Reconcile<T> {
    Positional,
    Keyed(KeyFn<T>),
}

impl<T> Reconcile<T> {
    pub fn keyed<F>(key_fn: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        Reconcile::Keyed(Arc::new(key_fn))
    }

    fn key(&self, value: &T) -> Option<String> {
        match self {
            Reconcile::Positional => None,
            Reconcile::Keyed(key_fn) => Some(key_fn(value)),
        }
    }
}

impl<T> Default for Reconcile<T> {
    fn default() -> Self {
        Reconcile::Positional
    }
}

impl<T> Clone for Reconcile<T> {
    fn clone(&self) -> Self {
        match self {
            Reconcile::Positional => Reconcile::Positional,
            Reconcile::Keyed(key_fn) => Reconcile::Keyed(Arc::clone(key_fn)),
        }
    }
}

impl<T> std::fmt::Debug for Reconcile<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reconcile::Positional => f.write_str("Positional"),
            Reconcile::Keyed(_) => f.write_str("Keyed"),
        }
    }
}

#[derive(Clone, PartialEq)]
struct Slot<S> {
    key: Option<String>,
    cell: S,
}

type Factory<S> = Arc<dyn Fn() -> S + Send + Sync>;

/// A reactive sequence whose elements are individually addressable slots.
///
/// `S` is the slot type produced by the factory; slots compare by identity.
pub struct StateArray<T, S = Signal<T>>
where
    T: StateValue,
    S: Writable<T> + StateValue,
{
    slots: Signal<Vec<Slot<S>>>,
    values: Computed<Vec<T>>,
    factory: Factory<S>,
    policy: Reconcile<T>,
}

impl<T, S> StateArray<T, S>
where
    T: StateValue,
    S: Writable<T> + StateValue,
{
    /// Create an empty array with positional reconciliation.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        Self::with_policy(factory, Reconcile::Positional)
    }

    /// Create an empty array that reconciles by key.
    pub fn keyed<F, K>(factory: F, key_fn: K) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
        K: Fn(&T) -> String + Send + Sync + 'static,
    {
        Self::with_policy(factory, Reconcile::keyed(key_fn))
    }

    pub fn with_policy<F>(factory: F, policy: Reconcile<T>) -> Self
    where
        F: Fn() -> S + Send + Sync + 'static,
    {
        let slots: Signal<Vec<Slot<S>>> = Signal::new(Vec::new());
        let values = {
            let slots = slots.clone();
            Computed::new(move || slots.get().iter().map(|slot| slot.cell.get()).collect())
        };
        Self {
            slots,
            values,
            factory: Arc::new(factory),
            policy,
        }
    }

    /// Current values, tracked.
    pub fn get(&self) -> Vec<T> {
        self.values.get()
    }

    /// Current values, untracked.
    pub fn peek(&self) -> Vec<T> {
        self.values.peek()
    }

    /// Replace the contents, reusing existing slots where the policy allows.
    ///
    /// Slot writes and the new slot list land as one batched update.
    pub fn set(&self, values: Vec<T>) {
        let (next, created) = self.reconcile(self.slots.peek(), &values);
        self.commit(next, created, values);
    }

    /// Like [`StateArray::set`], but first asks every receiving slot to
    /// validate its value. Nothing is written if any slot rejects.
    pub fn try_set(&self, values: Vec<T>) -> Result<()> {
        let (next, created) = self.reconcile(self.slots.peek(), &values);
        Self::check(&next, &values)?;
        self.commit(next, created, values);
        Ok(())
    }

    fn check(next: &[Slot<S>], values: &[T]) -> Result<()> {
        next.iter()
            .zip(values)
            .try_for_each(|(slot, value)| slot.cell.validate(value))
    }

    fn commit(&self, next: Vec<Slot<S>>, created: usize, values: Vec<T>) {
        tracing::debug!(
            previous = self.slots.peek().len(),
            next = next.len(),
            reused = next.len() - created,
            created,
            "reconciled collection"
        );
        batch(|| {
            for (slot, value) in next.iter().zip(values) {
                slot.cell.set(value);
            }
            self.slots.set(next);
        });
    }

    /// Match `values` to slots. Returns the new slot list and how many of
    /// its slots are fresh.
    fn reconcile(&self, previous: Vec<Slot<S>>, values: &[T]) -> (Vec<Slot<S>>, usize) {
        let mut created = 0usize;

        let next: Vec<Slot<S>> = match &self.policy {
            Reconcile::Positional => {
                let mut previous = previous.into_iter();
                values
                    .iter()
                    .map(|_| {
                        previous.next().unwrap_or_else(|| {
                            created += 1;
                            self.new_slot(None)
                        })
                    })
                    .collect()
            }
            Reconcile::Keyed(key_fn) => {
                let mut available: IndexMap<String, Slot<S>> = IndexMap::new();
                for slot in previous {
                    if let Some(key) = slot.key.clone() {
                        available.entry(key).or_insert(slot);
                    }
                }
                let mut used: Vec<String> = Vec::with_capacity(values.len());
                values
                    .iter()
                    .map(|value| {
                        let key = key_fn(value);
                        if used.contains(&key) {
                            tracing::warn!(%key, "duplicate key in keyed collection; using a fresh slot");
                        }
                        let slot = available.shift_remove(&key).unwrap_or_else(|| {
                            created += 1;
                            self.new_slot(Some(key.clone()))
                        });
                        used.push(key);
                        slot
                    })
                    .collect()
            }
        };

        (next, created)
    }

    fn new_slot(&self, key: Option<String>) -> Slot<S> {
        Slot {
            key,
            cell: (self.factory)(),
        }
    }

    /// Append a value in a fresh slot.
    pub fn push(&self, value: T) {
        let slot = self.new_slot(self.policy.key(&value));
        batch(|| {
            slot.cell.set(value);
            let mut next = self.slots.peek();
            next.push(slot);
            self.slots.set(next);
        });
    }

    /// Remove the last slot and return its value, or `None` when empty.
    pub fn pop(&self) -> Option<T> {
        let mut next = self.slots.peek();
        let slot = next.pop()?;
        self.slots.set(next);
        Some(slot.cell.peek())
    }

    /// Map over the current slots (tracked).
    pub fn map<U, F>(&self, mut f: F) -> Vec<U>
    where
        F: FnMut(&S) -> U,
    {
        self.slots.get().iter().map(|slot| f(&slot.cell)).collect()
    }

    /// Slots for which `f` returns true (tracked).
    pub fn filter<F>(&self, mut f: F) -> Vec<S>
    where
        F: FnMut(&S) -> bool,
    {
        self.slots
            .get()
            .into_iter()
            .filter(|slot| f(&slot.cell))
            .map(|slot| slot.cell)
            .collect()
    }

    /// The slot at `index` (tracked).
    pub fn slot(&self, index: usize) -> Option<S> {
        self.slots.get().get(index).map(|slot| slot.cell.clone())
    }

    /// All slots in order (tracked).
    pub fn slots(&self) -> Vec<S> {
        self.map(S::clone)
    }

    pub fn len(&self) -> usize {
        self.slots.get().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every slot.
    pub fn dispose(&self) {
        self.slots.set(Vec::new());
    }
}

impl<S> StateArray<Value, S>
where
    S: Writable<Value> + StateValue,
{
    /// Replace the contents from a dynamic JSON value.
    ///
    /// Fails with [`StateError::Shape`] unless `values` is an array, or with
    /// whatever error a receiving slot reports for its element. Nothing is
    /// written in either case.
    pub fn set_value(&self, values: Value) -> Result<()> {
        match values {
            Value::Array(items) => self.try_set(items),
            other => Err(StateError::shape("array", &other)),
        }
    }
}

impl<S> Readable<Value> for StateArray<Value, S>
where
    S: Writable<Value> + StateValue,
{
    fn get(&self) -> Value {
        Value::Array(StateArray::get(self))
    }

    fn peek(&self) -> Value {
        Value::Array(StateArray::peek(self))
    }
}

impl<S> Writable<Value> for StateArray<Value, S>
where
    S: Writable<Value> + StateValue,
{
    fn set(&self, value: Value) {
        if let Err(err) = self.set_value(value) {
            tracing::warn!(%err, "rejected write to collection");
        }
    }

    fn validate(&self, value: &Value) -> Result<()> {
        let Value::Array(items) = value else {
            return Err(StateError::shape("array", value));
        };
        let (next, _) = self.reconcile(self.slots.peek(), items);
        Self::check(&next, items)
    }
}

impl<T, S> Readable<Vec<T>> for StateArray<T, S>
where
    T: StateValue,
    S: Writable<T> + StateValue,
{
    fn get(&self) -> Vec<T> {
        StateArray::get(self)
    }

    fn peek(&self) -> Vec<T> {
        StateArray::peek(self)
    }
}

impl<T, S> Clone for StateArray<T, S>
where
    T: StateValue,
    S: Writable<T> + StateValue,
{
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            values: self.values.clone(),
            factory: Arc::clone(&self.factory),
            policy: self.policy.clone(),
        }
    }
}

impl<T, S> PartialEq for StateArray<T, S>
where
    T: StateValue,
    S: Writable<T> + StateValue,
{
    /// Identity: two handles are equal when they share the same slots.
    fn eq(&self, other: &Self) -> bool {
        self.slots.ptr_eq(&other.slots)
    }
}

impl<T, S> std::fmt::Debug for StateArray<T, S>
where
    T: StateValue + std::fmt::Debug,
    S: Writable<T> + StateValue,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateArray")
            .field("values", &self.peek())
            .field("policy", &self.policy)
            .finish()
    }
}
