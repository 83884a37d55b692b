//! Blocking counting semaphore (component design §4.4).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex as InnerLock;

use crate::panic::panic_msg;
use crate::tfc::core::{current_thread_id, ThreadId};
use crate::tfc::signal::UnmanagedSignal;

#[cfg(feature = "tfc")]
use crate::tfc::core::core;

/// Cap matching the host primitive's own limit (`sem_t`'s `SEM_VALUE_MAX`
/// is `i32::MAX` on every platform this crate targets).
pub const MAX: u64 = i32::MAX as u64;

struct State {
    count: u64,
    waiters: VecDeque<(ThreadId, Arc<UnmanagedSignal>)>,
}

pub struct Semaphore {
    state: InnerLock<State>,
}

impl Semaphore {
    pub fn new(initial: u64) -> Self {
        assert!(initial <= MAX, "Semaphore::new: initial value exceeds MAX");
        Semaphore { state: InnerLock::new(State { count: initial, waiters: VecDeque::new() }) }
    }

    /// Increments the counter, or releases the longest-waiting blocked
    /// thread directly if one exists.
    pub fn post(&self) {
        let mut guard = self.state.lock();
        match guard.waiters.pop_front() {
            Some((id, signal)) => {
                drop(guard);
                #[cfg(feature = "tfc")]
                core().mark_about_to_wake(id);
                signal.wake(false);
            }
            None => {
                if guard.count >= MAX {
                    drop(guard);
                    panic_msg("Semaphore::post: counter would exceed MAX");
                }
                guard.count += 1;
            }
        }
    }

    /// Decrements the counter, blocking while it is zero.
    pub fn wait(&self) {
        let id = current_thread_id();
        let mut guard = self.state.lock();
        if guard.count > 0 {
            guard.count -= 1;
            return;
        }

        let signal = UnmanagedSignal::new();
        guard.waiters.push_back((id, signal.clone()));
        drop(guard);

        let _span = tracing::trace_span!("osal_block", primitive = "semaphore", thread_id = ?id).entered();

        #[cfg(feature = "tfc")]
        core().report_blocked(id, None);

        signal.park();

        #[cfg(feature = "tfc")]
        core().report_unblocked(id);
    }

    pub fn try_wait(&self) -> bool {
        let mut guard = self.state.lock();
        if guard.count > 0 {
            guard.count -= 1;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    pub fn value(&self) -> u64 {
        self.state.lock().count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn post_then_wait_round_trips() {
        let sem = Semaphore::new(0);
        sem.post();
        sem.wait();
        assert_eq!(sem.value(), 0);
    }

    #[test]
    fn balanced_post_wait_pairs_restore_initial_value() {
        let sem = Semaphore::new(5);
        for _ in 0..10 {
            sem.post();
            sem.wait();
        }
        assert_eq!(sem.value(), 5);
    }

    #[test]
    #[cfg(not(feature = "tfc"))]
    fn wait_blocks_until_post() {
        crate::logging::init_test_logging();
        let sem = StdArc::new(Semaphore::new(0));
        let sem2 = sem.clone();
        let handle = thread::spawn(move || sem2.wait());
        thread::sleep(Duration::from_millis(20));
        sem.post();
        handle.join().unwrap();
    }
}
