//! Condition variable (component design §4.2).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex as InnerLock;

use super::mutex::Mutex;
use crate::panic::panic_msg;
use crate::tfc::clock::{now_ns, ClockId};
use crate::tfc::core::{current_thread_id, ThreadId};
use crate::tfc::signal::UnmanagedSignal;

#[cfg(feature = "tfc")]
use crate::tfc::core::core;

/// A wait-set associated with one (or more, by convention) [`Mutex`]
/// instances. Timeouts are interpreted on `monotonic-coarse` (§4.2).
pub struct ConditionVariable {
    waiters: InnerLock<VecDeque<(ThreadId, Arc<UnmanagedSignal>)>>,
}

impl Default for ConditionVariable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConditionVariable {
    pub fn new() -> Self {
        ConditionVariable { waiters: InnerLock::new(VecDeque::new()) }
    }

    fn require_latest_locked(mutex: &Mutex, what: &str) {
        if !mutex.is_latest_locked_by_caller() {
            panic_msg(format!("{what}: mutex is not the calling thread's latest-locked mutex"));
        }
    }

    /// Atomically unlocks `mutex` and enqueues; relocks `mutex` before
    /// returning, on every exit path. Spurious wake-ups are permitted —
    /// the caller must re-check its predicate. Precondition: `mutex` is the
    /// latest mutex locked by the calling thread (component design §4.2).
    pub fn wait(&self, mutex: &Mutex) {
        Self::require_latest_locked(mutex, "ConditionVariable::wait");
        let id = current_thread_id();
        let signal = UnmanagedSignal::new();
        self.waiters.lock().push_back((id, signal.clone()));
        mutex.unlock().expect("ConditionVariable::wait: mutex must be locked by the caller");

        let _span = tracing::trace_span!("osal_block", primitive = "condvar", thread_id = ?id).entered();

        #[cfg(feature = "tfc")]
        core().report_blocked(id, None);

        signal.park();

        #[cfg(feature = "tfc")]
        core().report_unblocked(id);

        mutex.lock();
    }

    /// Same as [`wait`](Self::wait), but also registers an absolute
    /// deadline on `monotonic-coarse`. Returns `true` on timeout, `false`
    /// on signal. A deadline already in the past is charged as a
    /// zero-duration wait (§4.2) and returns `true` immediately.
    pub fn time_limited_wait(&self, mutex: &Mutex, absolute_timeout_ns: u64) -> bool {
        Self::require_latest_locked(mutex, "ConditionVariable::time_limited_wait");
        let id = current_thread_id();

        #[cfg(feature = "tfc")]
        if core().check_expired(absolute_timeout_ns) {
            tracing::debug!(thread_id = ?id, deadline_ns = absolute_timeout_ns, "condvar wait charged as zero-duration");
            mutex.unlock().expect("ConditionVariable::time_limited_wait: mutex must be locked by the caller");
            mutex.lock();
            return true;
        }

        let signal = UnmanagedSignal::new();
        self.waiters.lock().push_back((id, signal.clone()));
        mutex.unlock().expect("ConditionVariable::time_limited_wait: mutex must be locked by the caller");

        let _span =
            tracing::trace_span!("osal_block", primitive = "condvar_timed", thread_id = ?id).entered();
        let timed_out;
        #[cfg(feature = "tfc")]
        {
            core().report_blocked(id, Some(absolute_timeout_ns));
            timed_out = signal.park();
            core().report_unblocked(id);
        }
        #[cfg(not(feature = "tfc"))]
        {
            let now = now_ns(ClockId::MonotonicCoarse);
            let remaining_ns = absolute_timeout_ns.saturating_sub(now);
            timed_out = signal.park_timeout(std::time::Duration::from_nanos(remaining_ns));
            if timed_out {
                self.waiters.lock().retain(|(wid, _)| *wid != id);
            }
        }

        mutex.lock();
        timed_out
    }

    /// Releases exactly one waiter, chosen by insertion order; lost if none
    /// are waiting.
    pub fn signal(&self) {
        if let Some((id, signal)) = self.waiters.lock().pop_front() {
            #[cfg(feature = "tfc")]
            core().mark_about_to_wake(id);
            signal.wake(false);
        }
    }

    /// Releases every current waiter.
    pub fn broadcast(&self) {
        let drained: VecDeque<_> = std::mem::take(&mut *self.waiters.lock());
        for (id, signal) in drained {
            #[cfg(feature = "tfc")]
            core().mark_about_to_wake(id);
            signal.wake(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;
    use std::time::Duration;

    #[test]
    #[cfg(not(feature = "tfc"))]
    fn signal_wakes_exactly_one_waiter_and_relocks() {
        crate::logging::init_test_logging();
        let mutex = StdArc::new(Mutex::new());
        let cv = StdArc::new(ConditionVariable::new());

        mutex.lock();
        let mutex2 = mutex.clone();
        let cv2 = cv.clone();
        let handle = thread::spawn(move || {
            mutex2.lock();
            cv2.wait(&mutex2);
            assert!(mutex2.is_locked());
            mutex2.unlock().unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        cv.signal();
        mutex.unlock().unwrap();
        handle.join().unwrap();
    }

    #[test]
    #[cfg(not(feature = "tfc"))]
    fn time_limited_wait_reports_timeout_and_relocks() {
        let mutex = Mutex::new();
        let cv = ConditionVariable::new();
        mutex.lock();
        let deadline = now_ns(ClockId::MonotonicCoarse) + Duration::from_millis(20).as_nanos() as u64;
        let timed_out = cv.time_limited_wait(&mutex, deadline);
        assert!(timed_out);
        assert!(mutex.is_locked());
        mutex.unlock().unwrap();
    }

    #[test]
    #[serial_test::serial(panic_hook)]
    fn wait_on_a_mutex_that_is_not_the_latest_locked_is_a_logic_error() {
        struct Unwind;
        impl crate::panic::PanicHandler for Unwind {
            fn handle(&self, _info: &crate::panic::PanicInfo) -> ! {
                std::panic::resume_unwind(Box::new(()));
            }
        }
        crate::panic::set_panic_handler(Box::new(Unwind));

        let a = Mutex::new();
        let b = Mutex::new();
        let cv = ConditionVariable::new();
        a.lock();
        b.lock();

        // `b` is the latest locked, not `a`: waiting on `a` must be rejected.
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cv.wait(&a)));

        crate::panic::reset_panic_handler();
        assert!(result.is_err());
        assert!(a.is_locked());
        assert!(b.is_locked());
        b.unlock().unwrap();
        a.unlock().unwrap();
    }
}
