//! Error taxonomy for the OSAL.
//!
//! Mirrors the error-kind table of the component design: `InvalidArgument`,
//! `Timeout`, `Logic`, and `ResourceExhaustion` are returned to callers.
//! `Fatal` conditions (dead-lock, a broken destructor invariant) never show
//! up here — they go straight through [`crate::panic`] and abort the
//! process. Cancellation is not an error at all; it unwinds via
//! [`crate::cancellation`].

use std::fmt;

/// Error returned by a fallible OSAL operation.
#[derive(Debug, thiserror::Error)]
pub enum OsalError {
    /// An out-of-range parameter was passed to an OSAL entry point.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A time-limited acquisition did not complete before its deadline.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// A precondition of the primitive was violated by the caller.
    #[error("logic error: {0}")]
    Logic(String),

    /// The host ran out of a resource needed to complete the operation
    /// (memory, OS thread/semaphore handles, ...).
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(String),
}

impl OsalError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        OsalError::InvalidArgument(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        OsalError::Timeout(msg.into())
    }

    pub fn logic(msg: impl Into<String>) -> Self {
        OsalError::Logic(msg.into())
    }

    pub fn resource_exhaustion(msg: impl Into<String>) -> Self {
        OsalError::ResourceExhaustion(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, OsalError>;

/// Marker type distinguishing "this timed out" from "this failed" at call
/// sites that care (the scoped lockers, per the component design's §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elapsed;

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deadline elapsed")
    }
}

impl std::error::Error for Elapsed {}
