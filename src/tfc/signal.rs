//! The "unmanaged" host wait primitive TFCCore uses to park and release a
//! real host thread (component design §2: "hand the real host thread to a
//! host-OS wait primitive that can be released by the TFC core").
//!
//! This is deliberately independent of [`crate::osal::condvar::ConditionVariable`]
//! — it is the low-level building block the OSAL primitives are built on
//! top of, not itself subject to TFC accounting.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct State {
    woken: bool,
    timed_out: bool,
}

pub struct UnmanagedSignal {
    state: Mutex<State>,
    cv: Condvar,
}

impl UnmanagedSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(UnmanagedSignal { state: Mutex::new(State::default()), cv: Condvar::new() })
    }

    /// Blocks the calling (real, host) thread until [`wake`] is called.
    /// Returns whether the wake was a timeout release.
    pub fn park(&self) -> bool {
        let mut guard = self.state.lock();
        while !guard.woken {
            self.cv.wait(&mut guard);
        }
        guard.timed_out
    }

    /// Blocks with a host-level bound, used by the host (non-TFC) build
    /// variant where there is no virtual clock to drive the release.
    pub fn park_timeout(&self, timeout: Duration) -> bool {
        let mut guard = self.state.lock();
        if !guard.woken {
            let result = self.cv.wait_for(&mut guard, timeout);
            if result.timed_out() && !guard.woken {
                guard.timed_out = true;
                guard.woken = true;
            }
        }
        guard.timed_out
    }

    /// Releases the parked thread. Returns whether this call was the one
    /// that actually delivered the wake — `false` means the waiter had
    /// already resolved on its own (typically a timeout racing this call),
    /// so the caller must not treat it as having accepted anything handed
    /// off alongside the wake (e.g. transferred lock ownership).
    pub fn wake(&self, timed_out: bool) -> bool {
        let mut guard = self.state.lock();
        if !guard.woken {
            guard.woken = true;
            guard.timed_out = timed_out;
            self.cv.notify_one();
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn wake_releases_parked_thread() {
        let sig = UnmanagedSignal::new();
        let sig2 = sig.clone();
        let handle = thread::spawn(move || sig2.park());
        thread::sleep(Duration::from_millis(20));
        sig.wake(false);
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn park_timeout_reports_timeout_when_nobody_wakes() {
        let sig = UnmanagedSignal::new();
        let start = Instant::now();
        let timed_out = sig.park_timeout(Duration::from_millis(20));
        assert!(timed_out);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn second_wake_is_reported_as_not_delivered() {
        let sig = UnmanagedSignal::new();
        assert!(sig.wake(false));
        assert!(!sig.wake(true), "the waiter already resolved via the first wake");
    }
}
