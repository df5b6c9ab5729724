//! Engine failure signals.
//!
//! Simulated network failures and cancellation are ordinary result
//! variants, never panics: the engine reserves errors for the
//! boundary, and flow control stays in `Result`s.

use thiserror::Error;

/// Transport-level failure reported instead of a response body when a
/// matched rule's network simulation fails the call.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// Simulated connection timeout
    #[error("simulated network timeout")]
    Timeout,

    /// Simulated offline network
    #[error("simulated offline network")]
    Offline,

    /// Random failure drawn against the rule's fail rate
    #[error("simulated random connection failure")]
    RandomFail,
}

/// Error returned by the cancellable wait primitive.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WaitError {
    /// The caller cancelled before or during the wait
    #[error("wait cancelled by caller")]
    Cancelled,
}
