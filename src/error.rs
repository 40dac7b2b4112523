//! Error types returned by map construction and cursors.

/// Rejected construction parameters.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum ConfigError {
    /// The load factor was zero, negative or NaN.
    #[error("illegal load factor: {0}")]
    InvalidLoadFactor(f32),
}

/// Failures raised by a [`Cursor`](crate::Cursor) step.
///
/// `IllegalState` and `NoSuchElement` are call-discipline errors; the cursor
/// remains usable. After `ConcurrentModification` the cursor should be
/// discarded.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterError {
    /// `next` was called with nothing pending and nothing left to visit.
    #[error("no further elements")]
    NoSuchElement,

    /// `remove` was called without a preceding successful `next`.
    #[error("remove called without a preceding next")]
    IllegalState,

    /// The map was structurally modified since the cursor's last own step.
    #[error("map was structurally modified during iteration")]
    ConcurrentModification,

    /// The cursor was handed a map other than the one it was created from.
    #[error("cursor used with a map it was not created from")]
    WrongMap,
}
