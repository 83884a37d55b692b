//! Operating System Abstraction Layer with Time-Flow-Control.
//!
//! [`osal`] exposes the portable primitives (mutex, condition variable,
//! read-write lock, semaphore, thread). [`tfc`] is the virtual-clock
//! supervisor they talk to when built with `--features tfc`; it is public
//! only for the clock-query and reproducibility-trap APIs applications
//! legitimately need, not as a general integration surface.

pub mod cancellation;
pub mod config;
pub mod error;
pub mod fsshim;
pub mod logging;
pub mod osal;
pub mod panic;
pub mod tfc;

pub use error::{OsalError, Result};
