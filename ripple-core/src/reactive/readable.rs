//! Read/write access shared by every reactive container.

use crate::error::Result;

/// Values that can live in a signal or computed.
///
/// `PartialEq` lets writes and recomputes that produce an equal value skip
/// notifying dependents.
pub trait StateValue: Clone + PartialEq + Send + Sync + 'static {}

impl<T> StateValue for T where T: Clone + PartialEq + Send + Sync + 'static {}

/// Something whose current value can be read.
pub trait Readable<T> {
    /// Read the value, registering a dependency when called inside a
    /// computed or effect.
    fn get(&self) -> T;

    /// Read the value without registering a dependency.
    fn peek(&self) -> T;
}

/// Something whose value can also be replaced.
pub trait Writable<T>: Readable<T> {
    fn set(&self, value: T);

    /// Check that `value` would be accepted by [`Writable::set`] without
    /// writing anything. Containers use it to reject a nested write before
    /// any part of it lands.
    fn validate(&self, _value: &T) -> Result<()> {
        Ok(())
    }
}
