//! Non-recursive exclusive lock (component design §4.1).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex as InnerLock;

use crate::error::{OsalError, Result};
use crate::panic::panic_msg;
use crate::tfc::core::{current_thread_id, ThreadId};
use crate::tfc::signal::UnmanagedSignal;

#[cfg(feature = "tfc")]
use crate::tfc::core::core;

thread_local! {
    /// The calling thread's currently-held mutexes, in lock order (component
    /// design §3: "the latest-locked mutex of a thread is remembered as a
    /// single-element stack"). A `Vec` rather than a literal single-element
    /// slot because a thread may hold more than one mutex at once; only the
    /// last element — the most recently locked one still held — matters for
    /// `is_latest_locked_by_caller`. Unlocking out of acquisition order
    /// removes from wherever the entry sits, not necessarily the top.
    static LOCKED_STACK: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

struct State {
    owner: Option<ThreadId>,
    waiters: VecDeque<(ThreadId, Arc<UnmanagedSignal>)>,
}

/// Owner-tracked mutual-exclusion lock with explicit `lock`/`unlock`
/// (deliberately not a Rust `lock()`-returns-a-guard API: the invariant
/// that only the owner may unlock, and that condition variables must be
/// able to ask "is this the caller's latest-locked mutex", is easiest to
/// state in terms of the original's explicit operations).
pub struct Mutex {
    state: InnerLock<State>,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    pub fn new() -> Self {
        Mutex { state: InnerLock::new(State { owner: None, waiters: VecDeque::new() }) }
    }

    fn identity(&self) -> usize {
        self as *const Mutex as usize
    }

    fn push_locked(&self) {
        let id = self.identity();
        LOCKED_STACK.with(|stack| stack.borrow_mut().push(id));
    }

    fn pop_locked(&self) {
        let id = self.identity();
        LOCKED_STACK.with(|stack| stack.borrow_mut().retain(|&held| held != id));
    }

    /// True if this is the most-recently-locked mutex, among those the
    /// calling thread still holds (component design §3, §4.2's
    /// `ConditionVariable::Wait` precondition).
    pub fn is_latest_locked_by_caller(&self) -> bool {
        let id = self.identity();
        LOCKED_STACK.with(|stack| stack.borrow().last() == Some(&id))
    }

    /// Blocks until the mutex is free, then claims ownership. Locking a
    /// mutex the calling thread already owns is a programming error.
    pub fn lock(&self) {
        let id = current_thread_id();
        let mut guard = self.state.lock();
        if guard.owner.is_none() {
            guard.owner = Some(id);
            drop(guard);
            self.push_locked();
            return;
        }
        if guard.owner == Some(id) {
            drop(guard);
            panic_msg("Mutex::lock: calling thread already owns this mutex");
        }

        let signal = UnmanagedSignal::new();
        guard.waiters.push_back((id, signal.clone()));
        drop(guard);

        let _span = tracing::trace_span!("osal_block", primitive = "mutex", thread_id = ?id).entered();

        #[cfg(feature = "tfc")]
        core().report_blocked(id, None);

        signal.park();

        #[cfg(feature = "tfc")]
        core().report_unblocked(id);
        // `unlock()` already transferred ownership to us before waking.
        self.push_locked();
    }

    /// Non-blocking variant; `Ok(true)` if the lock was acquired.
    pub fn try_lock(&self) -> bool {
        let id = current_thread_id();
        let mut guard = self.state.lock();
        if guard.owner.is_none() {
            guard.owner = Some(id);
            drop(guard);
            self.push_locked();
            true
        } else {
            false
        }
    }

    /// Releases ownership. Must be called by the owner.
    pub fn unlock(&self) -> Result<()> {
        let id = current_thread_id();
        let mut guard = self.state.lock();
        if guard.owner != Some(id) {
            return Err(OsalError::logic("Mutex::unlock: calling thread does not own this mutex"));
        }
        self.pop_locked();

        match guard.waiters.pop_front() {
            Some((next_id, signal)) => {
                guard.owner = Some(next_id);
                drop(guard);
                #[cfg(feature = "tfc")]
                core().mark_about_to_wake(next_id);
                signal.wake(false);
            }
            None => {
                guard.owner = None;
            }
        }
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().owner.is_some()
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.state.lock().owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;

    #[test]
    fn basic_lock_unlock_round_trip() {
        let m = Mutex::new();
        m.lock();
        assert!(m.is_locked());
        m.unlock().unwrap();
        assert!(!m.is_locked());
    }

    #[test]
    fn unlock_by_non_owner_is_a_logic_error() {
        let m = Mutex::new();
        m.lock();
        let result = m.unlock();
        assert!(result.is_ok());
        // A second unlock with no owner is itself a logic error.
        assert!(m.unlock().is_err());
    }

    #[test]
    fn try_lock_fails_while_held() {
        let m = StdArc::new(Mutex::new());
        m.lock();
        let m2 = m.clone();
        let acquired = thread::spawn(move || m2.try_lock()).join().unwrap();
        assert!(!acquired);
    }

    #[test]
    fn latest_locked_tracks_the_most_recent_still_held_mutex() {
        let a = Mutex::new();
        let b = Mutex::new();

        a.lock();
        assert!(a.is_latest_locked_by_caller());

        b.lock();
        assert!(!a.is_latest_locked_by_caller());
        assert!(b.is_latest_locked_by_caller());

        b.unlock().unwrap();
        assert!(a.is_latest_locked_by_caller());

        a.unlock().unwrap();
        assert!(!a.is_latest_locked_by_caller());
    }

    #[test]
    #[cfg(not(feature = "tfc"))]
    fn second_thread_waits_until_released() {
        crate::logging::init_test_logging();
        let m = StdArc::new(Mutex::new());
        m.lock();
        let m2 = m.clone();
        let handle = thread::spawn(move || {
            m2.lock();
            m2.unlock().unwrap();
        });
        thread::sleep(std::time::Duration::from_millis(20));
        m.unlock().unwrap();
        handle.join().unwrap();
    }
}
