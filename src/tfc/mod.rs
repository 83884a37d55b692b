//! Time-Flow-Control: the virtual clock, blocking accounting and
//! reproducibility traps that back the `tfc` build variant (component
//! design §3, §4.8).
//!
//! Everything in this module is an implementation detail shared by the
//! [`crate::osal`] primitives; application code never calls in here
//! directly except through [`clock::now_ns`] for the current wall time and
//! the trap types for test instrumentation.

pub mod clock;
pub mod core;
pub mod expiry;
pub mod signal;
pub mod traps;

pub use clock::ClockId;
pub use core::{current_thread_id, register_current_thread, ThreadId, ThreadRegistration};
pub use traps::{BlockWithExpiredTimeoutTrap, PotentialUnreproducibleBehaviourTrap, TrapRegistry, UnreproducibleBehaviourTrap};
