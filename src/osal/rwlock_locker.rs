//! Scoped lockers for [`RWLock`] (component design §4.3, §9 "scoped
//! lockers as move-only values").
//!
//! Each locker acquires on construction and releases on `Drop`. They are
//! move-only (no `Clone`/`Copy`): the release responsibility is carried by
//! exactly one instance at a time. Constructing from `None` produces a
//! passive locker that owns nothing and releases nothing.

use crate::error::Result;
use super::rwlock::RWLock;

pub struct RWLockReadLocker<'a> {
    lock: Option<&'a RWLock>,
}

impl<'a> RWLockReadLocker<'a> {
    pub fn new(lock: &'a RWLock) -> Self {
        lock.read_lock();
        RWLockReadLocker { lock: Some(lock) }
    }

    /// Acquires before `absolute_deadline_ns`, or returns a timeout error
    /// without constructing a locker that owns anything.
    pub fn with_timeout(lock: &'a RWLock, absolute_deadline_ns: u64) -> Result<Self> {
        lock.read_lock_timeout(absolute_deadline_ns)?;
        Ok(RWLockReadLocker { lock: Some(lock) })
    }

    /// A locker that owns no lock at all (mirrors constructing the
    /// original's scoped locker from a null pointer).
    pub fn passive() -> Self {
        RWLockReadLocker { lock: None }
    }
}

impl Drop for RWLockReadLocker<'_> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release_read_lock();
        }
    }
}

pub struct RWLockWriteLocker<'a> {
    lock: Option<&'a RWLock>,
}

impl<'a> RWLockWriteLocker<'a> {
    pub fn new(lock: &'a RWLock) -> Self {
        lock.write_lock();
        RWLockWriteLocker { lock: Some(lock) }
    }

    pub fn with_timeout(lock: &'a RWLock, absolute_deadline_ns: u64) -> Result<Self> {
        lock.write_lock_timeout(absolute_deadline_ns)?;
        Ok(RWLockWriteLocker { lock: Some(lock) })
    }

    pub fn passive() -> Self {
        RWLockWriteLocker { lock: None }
    }
}

impl Drop for RWLockWriteLocker<'_> {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release_write_lock();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_locker_releases_on_drop() {
        let lock = RWLock::new();
        {
            let _guard = RWLockReadLocker::new(&lock);
            assert!(!lock.try_write_lock());
        }
        assert!(lock.try_write_lock());
        lock.release_write_lock();
    }

    #[test]
    fn write_locker_releases_on_drop() {
        let lock = RWLock::new();
        {
            let _guard = RWLockWriteLocker::new(&lock);
            assert!(!lock.try_read_lock());
        }
        assert!(lock.try_read_lock());
        lock.release_read_lock();
    }

    #[test]
    fn passive_locker_releases_nothing() {
        let _guard = RWLockReadLocker::passive();
        let _guard2 = RWLockWriteLocker::passive();
    }

    #[test]
    #[cfg(not(feature = "tfc"))]
    fn timed_out_acquisition_yields_error_without_a_locker() {
        let lock = RWLock::new();
        lock.write_lock();
        let deadline = crate::tfc::clock::now_ns(crate::tfc::clock::ClockId::MonotonicCoarse) + 20_000_000;
        assert!(RWLockReadLocker::with_timeout(&lock, deadline).is_err());
        lock.release_write_lock();
    }
}
