//! Build-time configuration surface (component design §4.10, §6).
//!
//! There is no runtime configuration source: no environment variable, no
//! file. The only knob is the `tfc` Cargo feature, selected at build time,
//! which is why [`Config::current`] is a pure function instead of
//! something that parses anything.

/// Which time source backs the OSAL in this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildVariant {
    /// Real host threads and real wall-clock time.
    Host,
    /// Time-Flow-Control: a virtual clock synthesised from thread-blocking
    /// observations.
    Tfc,
}

impl BuildVariant {
    pub const fn active() -> Self {
        if cfg!(feature = "tfc") {
            BuildVariant::Tfc
        } else {
            BuildVariant::Host
        }
    }

    pub const fn is_tfc(self) -> bool {
        matches!(self, BuildVariant::Tfc)
    }
}

/// Platform constraints a [`crate::osal::thread::Thread::start`] validates
/// its `stack_size` argument against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub variant: BuildVariant,
    pub min_stack_size: usize,
    pub stack_alignment: usize,
    pub default_stack_size: usize,
    pub default_priority: u8,
}

/// Platform minimum stack size. Matches the smallest stack glibc's
/// `pthread_create` will accept on x86_64 Linux; other hosts are free to
/// require more, never less.
const MIN_STACK_SIZE: usize = 16 * 1024;
const STACK_ALIGNMENT: usize = 4096;
const DEFAULT_STACK_SIZE: usize = 1024 * 1024;
const DEFAULT_PRIORITY: u8 = 0;

static_assertions::const_assert!(MIN_STACK_SIZE % STACK_ALIGNMENT == 0);
static_assertions::const_assert!(DEFAULT_STACK_SIZE >= MIN_STACK_SIZE);

impl Config {
    pub const fn current() -> Self {
        Config {
            variant: BuildVariant::active(),
            min_stack_size: MIN_STACK_SIZE,
            stack_alignment: STACK_ALIGNMENT,
            default_stack_size: DEFAULT_STACK_SIZE,
            default_priority: DEFAULT_PRIORITY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_matches_feature_flag() {
        let expected = if cfg!(feature = "tfc") { BuildVariant::Tfc } else { BuildVariant::Host };
        assert_eq!(Config::current().variant, expected);
    }

    #[test]
    fn stack_defaults_are_consistent() {
        let c = Config::current();
        assert!(c.default_stack_size >= c.min_stack_size);
        assert_eq!(c.min_stack_size % c.stack_alignment, 0);
    }
}
