//! Process-wide panic supervisor (component design §4.9).
//!
//! Every OSAL contract violation that cannot be recovered from — a
//! dead-lock, a `Drop` invariant broken, a reproducibility trap firing —
//! routes here instead of returning an [`crate::error::OsalError`]. The
//! default handler writes `"PANIC: <message>"` (or `"PANIC: No message"`)
//! to stderr and aborts the process, matching §6 byte-for-byte.

use std::panic::Location;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// A panic handler. Must never unwind and must never return.
pub trait PanicHandler: Send + Sync {
    fn handle(&self, info: &PanicInfo) -> !;
}

/// Context passed to the installed panic handler.
#[derive(Debug, Clone)]
pub struct PanicInfo {
    pub message: Option<String>,
    pub location: Option<&'static str>,
}

impl PanicInfo {
    fn render(&self) -> String {
        match (&self.message, self.location) {
            (Some(m), Some(loc)) => format!("PANIC: {m} (at {loc})"),
            (Some(m), None) => format!("PANIC: {m}"),
            (None, Some(loc)) => format!("PANIC: No message (at {loc})"),
            (None, None) => "PANIC: No message".to_string(),
        }
    }
}

struct DefaultHandler;

impl PanicHandler for DefaultHandler {
    fn handle(&self, info: &PanicInfo) -> ! {
        eprintln!("{}", default_render(info));
        tracing::error!(message = info.message.as_deref(), "process aborting via OSAL panic");
        std::process::abort();
    }
}

/// Renders exactly the two forms specified by §6, ignoring location: this
/// is the string inspected by tests, keeping the location detail (useful
/// for humans reading stderr) out of the contract.
fn default_render(info: &PanicInfo) -> String {
    match &info.message {
        Some(m) => format!("PANIC: {m}"),
        None => "PANIC: No message".to_string(),
    }
}

static HOOK: RwLock<Option<Box<dyn PanicHandler>>> = RwLock::new(None);
static FORCED_DEFAULT_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Installs a custom panic handler. Returns the previously installed one,
/// if any (the default handler is represented as `None` being restored).
pub fn set_panic_handler(handler: Box<dyn PanicHandler>) {
    *HOOK.write() = Some(handler);
}

/// Removes any custom handler, reverting to the default stderr+abort path.
pub fn reset_panic_handler() {
    *HOOK.write() = None;
}

/// Number of times [`panic_forced_default`] has run in this process. Tests
/// that need to observe "did TFC panic" without actually aborting the test
/// binary can swap in a non-aborting handler and check this counter instead
/// — see `tfc::core` tests for the pattern.
pub fn forced_default_count() -> usize {
    FORCED_DEFAULT_COUNT.load(Ordering::SeqCst)
}

fn dispatch(info: PanicInfo) -> ! {
    let guard = HOOK.read();
    match guard.as_ref() {
        Some(h) => h.handle(&info),
        None => DefaultHandler.handle(&info),
    }
}

/// `Panic()` — no message, no dynamic memory required.
#[track_caller]
pub fn panic_plain() -> ! {
    dispatch(PanicInfo { message: None, location: Some(caller()) })
}

/// `Panic(msg)`.
#[track_caller]
pub fn panic_msg(msg: impl Into<String>) -> ! {
    dispatch(PanicInfo { message: Some(msg.into()), location: Some(caller()) })
}

/// `Panic(msg, exception)` — the message is augmented with the causing
/// error's `Display` output.
#[track_caller]
pub fn panic_with_source(msg: impl Into<String>, source: &dyn std::error::Error) -> ! {
    dispatch(PanicInfo {
        message: Some(format!("{}: {source}", msg.into())),
        location: Some(caller()),
    })
}

/// `Panic(file, line)`.
pub fn panic_at(file: &'static str, line: u32) -> ! {
    dispatch(PanicInfo { message: None, location: Some(Box::leak(format!("{file}:{line}").into_boxed_str())) })
}

/// `Panic(file, line, exception)`.
pub fn panic_at_with_source(file: &'static str, line: u32, source: &dyn std::error::Error) -> ! {
    dispatch(PanicInfo {
        message: Some(source.to_string()),
        location: Some(Box::leak(format!("{file}:{line}").into_boxed_str())),
    })
}

/// TFC's dead-lock and reproducibility decisions always use the *default*
/// handler, bypassing any user-installed hook (component design §4.8,
/// "Failure mode"). A forced-default panic still increments the counter
/// queried by [`forced_default_count`] so tests can assert it fired without
/// needing to fork a subprocess.
///
/// In test builds, [`enable_abort_free_test_mode`] can be used to turn this
/// terminal path into an ordinary unwind (still bypassing the swappable
/// [`PanicHandler`] hook, still rendering the exact §6 message to stderr)
/// so a single test binary can exercise more than one dead-lock scenario.
#[track_caller]
pub fn panic_forced_default(msg: impl Into<String>) -> ! {
    FORCED_DEFAULT_COUNT.fetch_add(1, Ordering::SeqCst);
    let info = PanicInfo { message: Some(msg.into()), location: Some(caller()) };

    #[cfg(test)]
    if ABORT_FREE_TEST_MODE.load(Ordering::SeqCst) {
        eprintln!("{}", default_render(&info));
        panic!("{}", default_render(&info));
    }

    DefaultHandler.handle(&info)
}

#[cfg(test)]
static ABORT_FREE_TEST_MODE: AtomicUsize = AtomicUsize::new(0);

/// Test-only: makes [`panic_forced_default`] unwind instead of aborting the
/// process, for the duration until [`disable_abort_free_test_mode`] is
/// called. Only meaningful to the same thread's panic hook dispatch, since
/// `std::process::abort` would otherwise take down the whole test binary.
#[cfg(test)]
pub fn enable_abort_free_test_mode() {
    ABORT_FREE_TEST_MODE.store(1, Ordering::SeqCst);
}

#[cfg(test)]
pub fn disable_abort_free_test_mode() {
    ABORT_FREE_TEST_MODE.store(0, Ordering::SeqCst);
}

#[track_caller]
fn caller() -> &'static str {
    let loc: &'static Location<'static> = Location::caller();
    Box::leak(format!("{}:{}", loc.file(), loc.line()).into_boxed_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;
    use std::sync::Arc;

    struct Recording {
        messages: Arc<StdMutex<Vec<String>>>,
    }

    impl PanicHandler for Recording {
        fn handle(&self, info: &PanicInfo) -> ! {
            self.messages.lock().unwrap().push(default_render(info));
            // A test handler must still terminate the "thread" logically;
            // we simulate that without aborting the test process.
            std::panic::resume_unwind(Box::new(RecordedPanic));
        }
    }

    struct RecordedPanic;

    #[test]
    #[serial_test::serial(panic_hook)]
    fn default_render_matches_contract() {
        assert_eq!(default_render(&PanicInfo { message: None, location: None }), "PANIC: No message");
        assert_eq!(
            default_render(&PanicInfo { message: Some("oops".into()), location: None }),
            "PANIC: oops"
        );
    }

    #[test]
    #[serial_test::serial(panic_hook)]
    fn custom_handler_is_invoked_and_can_be_reset() {
        let messages = Arc::new(StdMutex::new(Vec::new()));
        set_panic_handler(Box::new(Recording { messages: messages.clone() }));

        let result = std::panic::catch_unwind(|| {
            panic_msg("custom hook test");
        });
        assert!(result.is_err());
        assert_eq!(messages.lock().unwrap().as_slice(), ["PANIC: custom hook test"]);

        reset_panic_handler();
    }
}
