//! Ambient logging (component design §4.10).
//!
//! The OSAL and TFC core emit `tracing` events directly at their call
//! sites (span per blocking operation, `error!` right before the panic
//! supervisor aborts). This module only provides the one thing every test
//! binary in the crate needs and that `tracing` itself does not give you
//! for free: a subscriber installed exactly once, regardless of how many
//! test threads race to initialise it.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing_subscriber` `fmt` subscriber for the duration of the
/// test process, honouring `RUST_LOG` if set. Safe to call from every test;
/// only the first call has any effect.
#[cfg(test)]
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

#[cfg(not(test))]
pub fn init_test_logging() {
    let _ = &INIT;
}
