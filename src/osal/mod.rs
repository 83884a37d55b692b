//! Operating System Abstraction Layer (component design §4.1-§4.7).
//!
//! Every primitive here has the same two build variants: a default *host*
//! build that blocks on real host facilities (`parking_lot`'s condition
//! variable underneath [`crate::tfc::signal::UnmanagedSignal`]) and a `tfc`
//! build (`--features tfc`) where the exact same code additionally reports
//! every block/unblock transition to [`crate::tfc::core`] so the virtual
//! clock can drive it. The two variants share one implementation; the
//! handful of lines that talk to the TFC core are gated with
//! `#[cfg(feature = "tfc")]` rather than maintained as parallel source
//! files, since the surrounding synchronisation logic does not differ
//! between them (see DESIGN.md).

pub mod condvar;
pub mod mutex;
pub mod registry;
pub mod rwlock;
pub mod rwlock_locker;
pub mod semaphore;
pub mod semaphore_nb;
pub mod thread;

pub use condvar::ConditionVariable;
pub use mutex::Mutex;
pub use registry::ThreadRegistry;
pub use rwlock::RWLock;
pub use rwlock_locker::{RWLockReadLocker, RWLockWriteLocker};
pub use semaphore::Semaphore;
pub use semaphore_nb::NonBlockingSemaphore;
pub use thread::{terminate_now, CancellationPoint, SchedPolicy, Thread, ThreadState};
