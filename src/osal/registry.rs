//! Process-wide thread registry (component design §4.7).
//!
//! A single instance, reached through [`registry`]. All enumeration
//! methods require the scoped lock returned by [`ThreadRegistry::lock`];
//! the precondition is not machine-checked (mirrors the original API,
//! which also leaves this to the caller).

use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, MutexGuard};

use super::thread::ThreadState;
use crate::tfc::core::ThreadId;

pub(super) struct Record {
    pub name: String,
    pub id: ThreadId,
    pub state: Arc<Mutex<ThreadState>>,
}

pub struct ThreadRegistry {
    threads: Mutex<Vec<Record>>,
}

static REGISTRY: LazyLock<ThreadRegistry> = LazyLock::new(|| ThreadRegistry { threads: Mutex::new(Vec::new()) });

pub fn registry() -> &'static ThreadRegistry {
    &REGISTRY
}

impl ThreadRegistry {
    /// Acquires the scoped lock through which every other method must be
    /// called.
    pub fn lock(&self) -> ThreadRegistryLock<'_> {
        ThreadRegistryLock { guard: self.threads.lock() }
    }

    pub(super) fn register(&self, record: Record) {
        self.threads.lock().push(record);
    }

    pub(super) fn deregister(&self, id: ThreadId) {
        self.threads.lock().retain(|r| r.id != id);
    }
}

/// A scoped view into the registry. Holding this prevents concurrent
/// mutation; entries read through it may be stale the instant the lock is
/// released (component design §4.7: "iterators become invalid on unlock").
pub struct ThreadRegistryLock<'a> {
    guard: MutexGuard<'a, Vec<Record>>,
}

/// Snapshot of one registered thread, valid only while the owning
/// [`ThreadRegistryLock`] is held.
pub struct ThreadView<'a> {
    pub name: &'a str,
    pub id: ThreadId,
    pub state: ThreadState,
}

impl ThreadRegistryLock<'_> {
    pub fn nb_of_threads(&self) -> usize {
        self.guard.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = ThreadView<'_>> {
        self.guard.iter().map(|r| ThreadView { name: &r.name, id: r.id, state: *r.state.lock() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty_in_isolation() {
        // The registry is process-wide; this only checks the read API
        // shape, not an exact count, since other tests in the binary may
        // have registered threads of their own.
        let lock = registry().lock();
        assert!(lock.nb_of_threads() >= lock.iter().count());
    }
}
