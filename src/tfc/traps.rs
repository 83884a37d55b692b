//! Reproducibility traps (component design §4.8.6, §9).
//!
//! TFC's whole point is that the same sequence of OSAL calls produces the
//! same emulated schedule every run. A handful of situations break that
//! promise even though nothing has actually gone wrong functionally — a
//! timed wait whose deadline had already passed when it was issued, two
//! waiters racing for the same deadline, a primitive waking more than one
//! thread from the same expiry bucket. These traps let a test *observe*
//! that one of those situations occurred without aborting the process: they
//! record a non-fatal trip, the same way a test framework's "soft failure"
//! assertion works, rather than calling into [`crate::panic`].
//!
//! Only one instance of a given trap may be monitoring at a time; nesting
//! two instances of the same trap is a programming error in the test, not a
//! condition the trap itself needs to tolerate gracefully.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::LazyLock;

#[derive(Default)]
struct Counters {
    block_with_expired_timeout: AtomicUsize,
    potential_unreproducible_behaviour: AtomicUsize,
    unreproducible_behaviour: AtomicUsize,
}

#[derive(Default)]
struct Armed {
    block_with_expired_timeout: AtomicBool,
    potential_unreproducible_behaviour: AtomicBool,
    unreproducible_behaviour: AtomicBool,
}

/// Process-wide trap bookkeeping. Counters always accumulate; a trip only
/// counts toward a particular monitoring session if that trap was armed
/// when it fired.
pub struct TrapRegistry {
    armed: Armed,
    counters: Counters,
}

static REGISTRY: LazyLock<TrapRegistry> =
    LazyLock::new(|| TrapRegistry { armed: Armed::default(), counters: Counters::default() });

impl TrapRegistry {
    pub fn global() -> &'static TrapRegistry {
        &REGISTRY
    }

    /// Records a trip unconditionally. TFC core calls this from inside the
    /// big lock whenever the corresponding condition is detected, regardless
    /// of whether anything is currently monitoring — a trap that arms after
    /// the fact simply observes zero trips, matching "monitoring starts from
    /// zero" semantics.
    pub fn trip_block_with_expired_timeout(&self) {
        self.counters.block_with_expired_timeout.fetch_add(1, Ordering::SeqCst);
    }

    pub fn trip_potential_unreproducible_behaviour(&self) {
        self.counters.potential_unreproducible_behaviour.fetch_add(1, Ordering::SeqCst);
    }

    pub fn trip_unreproducible_behaviour(&self) {
        self.counters.unreproducible_behaviour.fetch_add(1, Ordering::SeqCst);
    }

    fn arm(&self, flag: &AtomicBool) {
        let already = flag.swap(true, Ordering::SeqCst);
        assert!(!already, "only one instance of this trap may monitor at a time");
    }

    fn disarm(&self, flag: &AtomicBool) {
        flag.store(false, Ordering::SeqCst);
    }
}

macro_rules! define_trap {
    ($name:ident, $flag:ident, $counter:ident, $doc:literal) => {
        #[doc = $doc]
        pub struct $name {
            baseline: usize,
            active: bool,
        }

        impl $name {
            /// Begins monitoring. Panics if another instance of this trap is
            /// already monitoring (component design §4.8.6: "no more than
            /// one instance... at any time").
            pub fn begin_monitoring() -> Self {
                let registry = TrapRegistry::global();
                registry.arm(&registry.armed.$flag);
                let baseline = registry.counters.$counter.load(Ordering::SeqCst);
                $name { baseline, active: true }
            }

            /// Stops monitoring and returns how many times the trap tripped
            /// since [`begin_monitoring`](Self::begin_monitoring).
            pub fn end_monitoring(mut self) -> usize {
                self.stop()
            }

            /// Trip count so far, without ending the monitoring session.
            pub fn trip_count(&self) -> usize {
                TrapRegistry::global().counters.$counter.load(Ordering::SeqCst) - self.baseline
            }

            fn stop(&mut self) -> usize {
                if self.active {
                    self.active = false;
                    let registry = TrapRegistry::global();
                    registry.disarm(&registry.armed.$flag);
                }
                self.trip_count()
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                self.stop();
            }
        }
    };
}

define_trap!(
    BlockWithExpiredTimeoutTrap,
    block_with_expired_timeout,
    block_with_expired_timeout,
    "Monitors for a timed block whose absolute deadline had already elapsed on the emulated clock when it was issued."
);
define_trap!(
    PotentialUnreproducibleBehaviourTrap,
    potential_unreproducible_behaviour,
    potential_unreproducible_behaviour,
    "Monitors for two or more waiters registering the exact same absolute deadline, which makes their relative wake order a coincidence of insertion rather than something TFC actually controls."
);
define_trap!(
    UnreproducibleBehaviourTrap,
    unreproducible_behaviour,
    unreproducible_behaviour,
    "Monitors for TFC releasing more than one waiter from the same expiry bucket in one clock advance, which fixes no relative wake order between them."
);

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial(tfc_traps)]
    fn begin_monitoring_twice_on_the_same_trap_panics() {
        let first = BlockWithExpiredTimeoutTrap::begin_monitoring();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            BlockWithExpiredTimeoutTrap::begin_monitoring()
        }));
        assert!(result.is_err());
        drop(first);
    }

    #[test]
    #[serial(tfc_traps)]
    fn monitoring_only_counts_trips_after_it_began() {
        TrapRegistry::global().trip_unreproducible_behaviour();
        let trap = UnreproducibleBehaviourTrap::begin_monitoring();
        assert_eq!(trap.trip_count(), 0);

        TrapRegistry::global().trip_unreproducible_behaviour();
        TrapRegistry::global().trip_unreproducible_behaviour();
        assert_eq!(trap.end_monitoring(), 2);
    }

    #[test]
    #[serial(tfc_traps)]
    fn dropping_without_end_monitoring_still_disarms() {
        {
            let _trap = PotentialUnreproducibleBehaviourTrap::begin_monitoring();
        }
        // Would panic if the previous instance were still considered armed.
        let trap = PotentialUnreproducibleBehaviourTrap::begin_monitoring();
        drop(trap);
    }
}
