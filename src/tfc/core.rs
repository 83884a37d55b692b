//! `TFCCore` — the single per-process Time-Flow-Control supervisor
//! (component design §3, §4.8).
//!
//! All bookkeeping — `vTime`, `liveThreads`, `blockedThreads`,
//! `aboutToWake`, the expiry queue — lives behind one internal mutex, the
//! "big lock" of §5. Every transition described in §4.8 is implemented as
//! one locked critical section here.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use parking_lot::Mutex;

use crate::panic::panic_forced_default;
use super::expiry::ExpiryQueue;
use super::signal::UnmanagedSignal;
use super::traps::TrapRegistry;

/// Opaque identity of an OSAL-managed thread, as seen by TFCCore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    #[cfg(test)]
    pub fn for_test(n: u64) -> Self {
        ThreadId(n)
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_ID: std::cell::Cell<Option<ThreadId>> = const { std::cell::Cell::new(None) };
}

/// Returns this thread's TFCCore identity, allocating one the first time it
/// is observed. This is bookkeeping only — it does not add the thread to
/// `liveThreads`. Live-thread registration is a separate, explicit act (see
/// [`TfcCore::on_thread_started`] and [`register_current_thread`]), mirroring
/// §3's "every host thread that uses OSAL... is registered explicitly" rule:
/// identity is cheap and implicit, liveness accounting is not.
pub fn current_thread_id() -> ThreadId {
    CURRENT_ID.with(|cell| {
        if let Some(id) = cell.get() {
            return id;
        }
        let id = ThreadId(NEXT_ID.fetch_add(1, Ordering::SeqCst));
        cell.set(Some(id));
        id
    })
}

/// RAII registration of the calling thread as live, for code that runs on a
/// bare host thread rather than a managed [`crate::osal::thread::Thread`]
/// (the process's initial thread, or a test harness thread that drives TFC
/// primitives directly). Dropping the guard deregisters the thread exactly
/// as [`TfcCore::on_thread_ended`] would for a managed thread's exit.
#[must_use]
pub struct ThreadRegistration {
    id: ThreadId,
}

impl ThreadRegistration {
    pub fn id(&self) -> ThreadId {
        self.id
    }
}

impl Drop for ThreadRegistration {
    fn drop(&mut self) {
        core().on_thread_ended(self.id);
    }
}

/// Registers the calling thread as live for as long as the returned guard is
/// held. Reentrant: calling it twice on the same thread registers it twice
/// and each guard must be dropped independently.
pub fn register_current_thread() -> ThreadRegistration {
    let id = current_thread_id();
    core().inner.lock().live_threads += 1;
    ThreadRegistration { id }
}

struct Inner {
    v_time_ns: u64,
    v_time_realtime_offset_ns: i64,
    live_threads: i64,
    blocked_threads: i64,
    about_to_wake: HashSet<ThreadId>,
    expiry: ExpiryQueue,
}

impl Inner {
    fn new() -> Self {
        Inner {
            v_time_ns: 0,
            v_time_realtime_offset_ns: 0,
            live_threads: 0,
            blocked_threads: 0,
            about_to_wake: HashSet::new(),
            expiry: ExpiryQueue::default(),
        }
    }

    /// Checks for "every live thread blocked" (§4.8 transitions 2 and 3)
    /// and either advances the clock or panics with dead-lock.
    fn check_all_blocked(&mut self) {
        if self.live_threads <= 0 {
            return;
        }
        if self.blocked_threads != self.live_threads || !self.about_to_wake.is_empty() {
            return;
        }

        match self.expiry.pop_earliest_bucket() {
            None => {
                panic_forced_default("Dead-Lock detected. All threads permanently blocked.");
            }
            Some((deadline, bucket)) => {
                self.v_time_ns = deadline;
                if bucket.len() > 1 {
                    TrapRegistry::global().trip_unreproducible_behaviour();
                }
                for entry in bucket {
                    self.about_to_wake.insert(entry.id);
                    entry.signal.wake(true);
                }
            }
        }
    }
}

pub struct TfcCore {
    inner: Mutex<Inner>,
}

static CORE: LazyLock<TfcCore> = LazyLock::new(|| TfcCore { inner: Mutex::new(Inner::new()) });

pub fn core() -> &'static TfcCore {
    &CORE
}

impl TfcCore {
    /// Called by a managed thread as the first action of its entry function
    /// (component design §3: "adds itself to liveThreads before running the
    /// entry function"). Also fixes this thread's identity for the lifetime
    /// of the call, so subsequent [`current_thread_id`] calls on the same
    /// thread return the same id instead of allocating a new one.
    pub fn on_thread_started(&self) -> ThreadId {
        let id = current_thread_id();
        let mut inner = self.inner.lock();
        inner.live_threads += 1;
        id
    }

    pub fn on_thread_ended(&self, id: ThreadId) {
        let mut inner = self.inner.lock();
        inner.live_threads -= 1;
        inner.about_to_wake.remove(&id);
        inner.expiry.remove(id);
        inner.check_all_blocked();
    }

    /// True if `deadline_ns` has already elapsed on the emulated clock. A
    /// caller whose absolute timeout has already passed must charge the
    /// wait as zero-duration (component design §4.2) and never call
    /// [`report_blocked`](Self::report_blocked) at all — entering the
    /// blocked/expiry bookkeeping for an already-expired deadline would wait
    /// for every other live thread to block too, instead of returning
    /// immediately.
    pub fn check_expired(&self, deadline_ns: u64) -> bool {
        let inner = self.inner.lock();
        if deadline_ns <= inner.v_time_ns {
            TrapRegistry::global().trip_block_with_expired_timeout();
            true
        } else {
            false
        }
    }

    /// Begins a block: increments `blockedThreads`, optionally registers an
    /// absolute-deadline expiry entry, runs the traps of §4.8.6, and — if
    /// this makes every live thread blocked — advances the clock or panics.
    /// Returns the [`UnmanagedSignal`] the caller must `park`/`park_timeout`
    /// on. Callers with a timeout must have already ruled out
    /// [`check_expired`](Self::check_expired) for that deadline.
    pub fn report_blocked(&self, id: ThreadId, absolute_deadline_ns: Option<u64>) -> Arc<UnmanagedSignal> {
        let signal = UnmanagedSignal::new();
        let mut inner = self.inner.lock();
        inner.blocked_threads += 1;

        if let Some(deadline) = absolute_deadline_ns {
            if inner.expiry.has_deadline(deadline) {
                TrapRegistry::global().trip_potential_unreproducible_behaviour();
            }
            inner.expiry.insert(deadline, id, signal.clone());
        }

        inner.check_all_blocked();
        signal
    }

    /// Ends a block: clears `aboutToWake`, cancels any still-pending
    /// expiry entry (the wake may have come from a primitive signal rather
    /// than a timeout), and decrements `blockedThreads`.
    pub fn report_unblocked(&self, id: ThreadId) {
        let mut inner = self.inner.lock();
        inner.about_to_wake.remove(&id);
        inner.expiry.remove(id);
        inner.blocked_threads -= 1;
    }

    /// Marks `id` as about to wake without releasing it through the expiry
    /// queue — used by primitives whose own signal (mutex unlock, cv
    /// signal/broadcast, semaphore post) releases a waiter directly
    /// (component design §4.1, §4.2: "marks that thread aboutToWake").
    pub fn mark_about_to_wake(&self, id: ThreadId) {
        let mut inner = self.inner.lock();
        inner.about_to_wake.insert(id);
    }

    pub fn emulated_monotonic_ns(&self) -> u64 {
        self.inner.lock().v_time_ns
    }

    pub fn emulated_realtime_ns(&self) -> u64 {
        let inner = self.inner.lock();
        (inner.v_time_ns as i64 + inner.v_time_realtime_offset_ns) as u64
    }

    pub fn set_realtime_offset_ns(&self, offset_ns: i64) {
        self.inner.lock().v_time_realtime_offset_ns = offset_ns;
    }

    #[cfg(test)]
    pub fn live_and_blocked(&self) -> (i64, i64) {
        let inner = self.inner.lock();
        (inner.live_threads, inner.blocked_threads)
    }
}

/// Convenience used by [`crate::osal::thread::Thread::sleep_ns`] and every
/// timed wait: converts a relative duration to an absolute deadline on the
/// emulated clock.
pub fn deadline_from_now(relative: Duration) -> u64 {
    core().emulated_monotonic_ns().saturating_add(relative.as_nanos() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::thread;
    use std::time::Duration as StdDuration;

    // TFCCore is a process-wide singleton; these tests must not interleave
    // with each other or with tests elsewhere that touch the shared core.
    #[test]
    #[serial(tfc_core)]
    fn clock_advances_monotonically_and_never_retreats() {
        crate::logging::init_test_logging();
        let before = core().emulated_monotonic_ns();
        let id = core().on_thread_started();
        let other = core().on_thread_started();

        let sig = core().report_blocked(id, Some(before + 100));
        // `other` is not blocked, so the process is not "all blocked" yet;
        // this call alone must not advance the clock.
        assert_eq!(core().emulated_monotonic_ns(), before);

        let _sig2 = core().report_blocked(other, Some(before + 50));
        // Now both live threads are blocked: TFC must advance to the
        // earliest deadline (before + 50).
        assert!(sig.park_timeout(StdDuration::from_millis(200)));
        assert_eq!(core().emulated_monotonic_ns(), before + 100);

        core().report_unblocked(id);
        core().report_unblocked(other);
        core().on_thread_ended(id);
        core().on_thread_ended(other);
    }

    #[test]
    #[serial(tfc_core)]
    fn all_blocked_with_no_expiry_panics_dead_lock() {
        crate::logging::init_test_logging();
        crate::panic::enable_abort_free_test_mode();
        let before_trips = crate::panic::forced_default_count();
        let id = core().on_thread_started();

        let handle = thread::spawn(move || {
            let _ = core().report_blocked(id, None);
        });
        let result = handle.join();
        crate::panic::disable_abort_free_test_mode();

        assert!(result.is_err(), "blocking with no expiry queued must panic");
        assert!(crate::panic::forced_default_count() > before_trips);

        core().report_unblocked(id);
        core().on_thread_ended(id);
    }
}
