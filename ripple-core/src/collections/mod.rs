//! State Containers
//!
//! Containers built on top of the reactive primitives:
//!
//! - [`StateArray`]: an ordered sequence of reactive slots
//! - [`StateObject`]: a fixed set of named fields read as one snapshot

mod array;
mod object;

pub use array::{KeyFn, Reconcile, StateArray};
pub use object::{Field, StateObject};
