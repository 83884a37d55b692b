//! Deferred thread cancellation, modelled as unwinding (component design
//! §4.6, §9 "Cancellation as exception").
//!
//! Rust has no native cooperative-cancellation primitive, so — exactly as
//! §9 recommends — this crate picks the language's native unwinding
//! mechanism: a dedicated panic payload. [`crate::osal::thread::Thread`]
//! installs a `catch_unwind` trampoline around the entry function that
//! recognises this payload and turns it into a normal `terminated` state
//! transition instead of propagating it as a crashed thread. Any other
//! `catch_unwind` in application code that does not resume-unwind an
//! unrecognised payload risks swallowing a cancellation; application code
//! is expected to follow the same rule the original's `catch (...)` advice
//! does.

use std::any::Any;

/// The panic payload thrown by [`raise`] to unwind a thread that is being
/// cancelled. Carries nothing — cancellation has no "cause" beyond "someone
/// called `Cancel`".
#[derive(Debug)]
pub struct CancellationSignal;

/// Unwinds the current thread via a panic carrying [`CancellationSignal`].
/// Never returns.
pub fn raise() -> ! {
    std::panic::panic_any(CancellationSignal)
}

/// True if a `catch_unwind` payload is a [`CancellationSignal`] that must be
/// resumed rather than swallowed.
pub fn is_cancellation(payload: &(dyn Any + Send)) -> bool {
    payload.downcast_ref::<CancellationSignal>().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raise_is_caught_and_recognised() {
        let result = std::panic::catch_unwind(raise);
        match result {
            Ok(()) => panic!("raise() must unwind, not return"),
            Err(payload) => assert!(is_cancellation(&payload)),
        }
    }

    #[test]
    fn ordinary_panics_are_not_mistaken_for_cancellation() {
        let result = std::panic::catch_unwind(|| {
            panic!("not a cancellation");
        });
        match result {
            Ok(()) => panic!("expected panic"),
            Err(payload) => assert!(!is_cancellation(&payload)),
        }
    }
}
