//! Managed thread with explicit lifecycle and deferred cancellation
//! (component design §4.6).

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex as InnerLock;

use super::registry::{registry, Record};
use crate::cancellation;
use crate::config::Config;
use crate::error::{OsalError, Result};
use crate::panic::panic_msg;
use crate::tfc::core::{core, current_thread_id, deadline_from_now, ThreadId};
use crate::tfc::signal::UnmanagedSignal;

pub type ExitValue = Box<dyn Any + Send>;
type Entry = Box<dyn FnOnce(CancellationPoint) -> ExitValue + Send>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    Inherit,
    Other,
    Idle,
    Batch,
    Fifo,
    RoundRobin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    NotStarted,
    Starting,
    Running,
    Terminated,
    Joined,
}

struct CancelShared {
    owner_id: OnceLock<ThreadId>,
    enabled: AtomicBool,
    pending: AtomicBool,
}

/// Handle an entry function uses to observe and act on its own deferred
/// cancellation. Every method panics (programming error) if called from a
/// thread other than the one this point belongs to.
#[derive(Clone)]
pub struct CancellationPoint {
    shared: Arc<CancelShared>,
}

impl CancellationPoint {
    fn is_it_me(&self) -> bool {
        self.shared.owner_id.get() == Some(&current_thread_id())
    }

    fn require_it_me(&self, what: &str) {
        if !self.is_it_me() {
            panic_msg(format!("{what}: called by a thread other than the one it belongs to"));
        }
    }

    /// Returns the previous value.
    pub fn set_cancelability_enabled(&self, enabled: bool) -> bool {
        self.require_it_me("CancellationPoint::set_cancelability_enabled");
        self.shared.enabled.swap(enabled, Ordering::SeqCst)
    }

    pub fn is_cancellation_pending(&self) -> bool {
        self.shared.pending.load(Ordering::SeqCst)
    }

    /// If cancellation is enabled and pending, unwinds via
    /// [`cancellation::raise`] and never returns.
    pub fn test_for_cancellation(&self) {
        self.require_it_me("CancellationPoint::test_for_cancellation");
        if self.shared.enabled.load(Ordering::SeqCst) && self.shared.pending.load(Ordering::SeqCst) {
            cancellation::raise();
        }
    }
}

/// A marker payload unwound by [`terminate_now`], distinct from
/// [`cancellation::CancellationSignal`] so the trampoline can tell "asked to
/// stop" from "decided to stop, with a result".
struct TerminateNowSignal(ExitValue);

/// Ends the *calling* managed thread immediately, unwinding the stack and
/// delivering `exit_value` to whoever eventually `join`s it. Must be called
/// from within a thread started via [`Thread::start`].
pub fn terminate_now(exit_value: ExitValue) -> ! {
    std::panic::panic_any(TerminateNowSignal(exit_value))
}

/// Owns a host thread exclusively between `start` and `join`. Dropping a
/// `Thread` that was started but never joined is a programming error and
/// triggers Panic (component design §4.6).
pub struct Thread {
    name: String,
    state: Arc<InnerLock<ThreadState>>,
    cancel: Arc<CancelShared>,
    join_signal: Arc<UnmanagedSignal>,
    join_handle: InnerLock<Option<std::thread::JoinHandle<()>>>,
    exit_value: Arc<InnerLock<Option<ExitValue>>>,
}

impl Thread {
    pub fn new(name: impl Into<String>) -> Self {
        Thread {
            name: name.into(),
            state: Arc::new(InnerLock::new(ThreadState::NotStarted)),
            cancel: Arc::new(CancelShared {
                owner_id: OnceLock::new(),
                enabled: AtomicBool::new(true),
                pending: AtomicBool::new(false),
            }),
            join_signal: UnmanagedSignal::new(),
            join_handle: InnerLock::new(None),
            exit_value: Arc::new(InnerLock::new(None)),
        }
    }

    fn state(&self) -> ThreadState {
        *self.state.lock()
    }

    /// Validates scheduling parameters, registers with the
    /// [`super::registry::ThreadRegistry`], and launches the host thread.
    /// Returns once the host thread has been spawned; the registry entry
    /// and the TFC live-thread count are finalised by the new thread itself
    /// as the first action of its entry (component design §3).
    pub fn start<F>(&self, entry: F, policy: SchedPolicy, priority: u8, stack_size: usize) -> Result<()>
    where
        F: FnOnce(CancellationPoint) -> ExitValue + Send + 'static,
    {
        if self.state() != ThreadState::NotStarted {
            return Err(OsalError::logic("Thread::start: already started"));
        }
        if priority > 31 {
            return Err(OsalError::invalid_argument("Thread::start: priority must be 0..=31"));
        }
        let cfg = Config::current();
        if stack_size < cfg.min_stack_size || stack_size % cfg.stack_alignment != 0 {
            return Err(OsalError::invalid_argument("Thread::start: stack_size below minimum or misaligned"));
        }
        let _ = policy; // scheduling policy is advisory on the host variant; recorded for get_info only.

        *self.state.lock() = ThreadState::Starting;

        let state = self.state.clone();
        let cancel = self.cancel.clone();
        let join_signal = self.join_signal.clone();
        let exit_value = self.exit_value.clone();
        let entry: Entry = Box::new(entry);
        let name = self.name.clone();
        let started_signal = UnmanagedSignal::new();
        let started_signal_child = started_signal.clone();

        let builder = std::thread::Builder::new().name(name.clone()).stack_size(stack_size);
        let handle = builder
            .spawn(move || {
                let id = core().on_thread_started();
                let _ = cancel.owner_id.set(id);
                registry().register(Record { name: name.clone(), id, state: state.clone() });
                *state.lock() = ThreadState::Running;
                started_signal_child.wake(false);

                let cp = CancellationPoint { shared: cancel.clone() };
                let result = std::panic::catch_unwind(AssertUnwindSafe(|| entry(cp)));

                match result {
                    Ok(value) => {
                        *exit_value.lock() = Some(value);
                    }
                    Err(payload) => match payload.downcast::<TerminateNowSignal>() {
                        Ok(terminate) => {
                            *exit_value.lock() = Some(terminate.0);
                        }
                        Err(payload) => {
                            if cancellation::is_cancellation(payload.as_ref()) {
                                // Cancelled with no result to deliver.
                            } else {
                                let message = describe_panic_payload(payload.as_ref());
                                crate::panic::panic_msg(format!("Thread '{name}' entry function panicked: {message}"));
                            }
                        }
                    },
                }

                *state.lock() = ThreadState::Terminated;
                registry().deregister(id);
                join_signal.wake(false);
                core().on_thread_ended(id);
            })
            .map_err(|e| OsalError::resource_exhaustion(e.to_string()))?;

        *self.join_handle.lock() = Some(handle);

        // §4.6: "launches host thread, waits until the new thread has
        // entered running". Parking here (rather than busy-polling `state`)
        // also closes a TFC determinism gap: `on_thread_started()` runs
        // inside the spawned closure, so returning before it has run would
        // let the caller block immediately afterwards while `live_threads`
        // still excludes the new thread, making `blocked == live`
        // prematurely true.
        started_signal.park();
        Ok(())
    }

    pub fn get_info(&self) -> (String, ThreadState) {
        (self.name.clone(), self.state())
    }

    pub fn get_pid() -> u32 {
        std::process::id()
    }

    pub fn get_stack_align() -> usize {
        Config::current().stack_alignment
    }

    pub fn get_min_stack_size() -> usize {
        Config::current().min_stack_size
    }

    pub fn get_default_stack_size() -> usize {
        Config::current().default_stack_size
    }

    pub fn is_it_me(&self) -> bool {
        self.cancel.owner_id.get() == Some(&current_thread_id())
    }

    /// Requests deferred cancellation. A thread may not cancel itself.
    pub fn cancel(&self) -> Result<()> {
        if self.is_it_me() {
            return Err(OsalError::logic("Thread::cancel: a thread cannot cancel itself"));
        }
        self.cancel.pending.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn is_cancellation_pending(&self) -> bool {
        self.cancel.pending.load(Ordering::SeqCst)
    }

    /// Relative sleep of the calling thread. Under the `tfc` feature this
    /// registers an expiry entry at `vTime + duration` instead of actually
    /// sleeping.
    pub fn sleep_ns(duration: Duration) {
        #[cfg(feature = "tfc")]
        {
            let id = current_thread_id();
            let _span = tracing::trace_span!("osal_block", primitive = "sleep", thread_id = ?id).entered();
            let deadline = deadline_from_now(duration);
            let signal = core().report_blocked(id, Some(deadline));
            signal.park();
            core().report_unblocked(id);
        }
        #[cfg(not(feature = "tfc"))]
        std::thread::sleep(duration);
    }

    pub fn sleep_ms(ms: u64) {
        Self::sleep_ns(Duration::from_millis(ms))
    }

    /// Blocks until the thread is terminated; exactly one join per start.
    pub fn join(&self) -> Result<Option<ExitValue>> {
        if self.is_it_me() {
            return Err(OsalError::logic("Thread::join: a thread cannot join itself"));
        }
        match self.state() {
            ThreadState::NotStarted => return Err(OsalError::logic("Thread::join: thread was never started")),
            ThreadState::Joined => return Err(OsalError::logic("Thread::join: already joined")),
            _ => {}
        }

        let id = current_thread_id();
        let _span = tracing::trace_span!("osal_block", primitive = "join", thread_id = ?id).entered();
        while self.state() != ThreadState::Terminated {
            #[cfg(feature = "tfc")]
            core().report_blocked(id, None);
            self.join_signal.park();
            #[cfg(feature = "tfc")]
            core().report_unblocked(id);
        }

        if let Some(handle) = self.join_handle.lock().take() {
            let _ = handle.join();
        }
        *self.state.lock() = ThreadState::Joined;
        Ok(self.exit_value.lock().take())
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        if matches!(self.state(), ThreadState::Starting | ThreadState::Running) {
            panic_msg("Thread dropped while its host thread is still Start'ed but not Join'ed");
        }
    }
}

fn describe_panic_payload(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
