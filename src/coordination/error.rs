//! Coordination error types.

use snafu::Snafu;

/// Errors from coordination primitives.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CoordinationError {
    /// A try-acquire found the lock held elsewhere.
    #[snafu(display("lock '{key}' is already held"))]
    LockHeld {
        /// The contended lock key.
        key: String,
    },

    /// An unlock was issued by a handle that holds nothing.
    #[snafu(display("lock '{key}' is not held by this handle"))]
    NotLocked {
        /// The lock key.
        key: String,
    },

    /// An unexpected coordinator fault.
    #[snafu(display("coordination fault: {message}"))]
    Internal {
        /// Description of the fault.
        message: String,
    },
}
