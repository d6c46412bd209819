/*!

A thin wrapper over `tracing` that gives the rest of the crate a small, stable logging vocabulary independent of
whatever framework backs it. Call sites use the `critical!`/`error!`/`warning!`/`info!`/`debug!`/`trace!` macros;
none of them need to know that `tracing` is doing the work underneath, and swapping the backing implementation
(e.g. for `log`+`env_logger`) would only touch this module.

Each macro also accepts a numeric verbosity threshold as an optional leading argument (`debug!(2, "...")`), checked
against a process-wide threshold set with [`set_global_logging_threshold`]. This mirrors the verbosity-level
command-line flags of the original model checker (`-v 0` through `-v 5`) without requiring every call site to
thread a `RunConfig` through just to decide whether to print.

*/

use std::sync::atomic::{AtomicU8, Ordering};

static GLOBAL_THRESHOLD: AtomicU8 = AtomicU8::new(1);

/// Sets the global verbosity threshold. Messages logged with a higher numeric level than this are suppressed by
/// the leveled macro variants (`critical!(level, ...)` etc.).
pub fn set_global_logging_threshold(level: u8) {
    GLOBAL_THRESHOLD.store(level, Ordering::Relaxed);
}

pub fn get_global_logging_threshold() -> u8 {
    GLOBAL_THRESHOLD.load(Ordering::Relaxed)
}

/// Returns `true` if a message logged at `level` should be emitted given the current global threshold.
#[doc(hidden)]
pub fn level_enabled(level: u8) -> bool {
    level <= get_global_logging_threshold()
}

#[macro_export]
macro_rules! critical {
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::level_enabled($level) {
            $crate::tracing::error!($($arg)+);
        }
    };
    ($($arg:tt)+) => {
        $crate::tracing::error!($($arg)+);
    };
}

#[macro_export]
macro_rules! error {
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::level_enabled($level) {
            $crate::tracing::error!($($arg)+);
        }
    };
    ($($arg:tt)+) => {
        $crate::tracing::error!($($arg)+);
    };
}

#[macro_export]
macro_rules! warning {
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::level_enabled($level) {
            $crate::tracing::warn!($($arg)+);
        }
    };
    ($($arg:tt)+) => {
        $crate::tracing::warn!($($arg)+);
    };
}

#[macro_export]
macro_rules! info {
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::level_enabled($level) {
            $crate::tracing::info!($($arg)+);
        }
    };
    ($($arg:tt)+) => {
        $crate::tracing::info!($($arg)+);
    };
}

#[macro_export]
macro_rules! debug {
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::level_enabled($level) {
            $crate::tracing::debug!($($arg)+);
        }
    };
    ($($arg:tt)+) => {
        $crate::tracing::debug!($($arg)+);
    };
}

#[macro_export]
macro_rules! trace {
    ($level:expr, $($arg:tt)+) => {
        if $crate::log::level_enabled($level) {
            $crate::tracing::trace!($($arg)+);
        }
    };
    ($($arg:tt)+) => {
        $crate::tracing::trace!($($arg)+);
    };
}

/// Installs a `tracing_subscriber` formatting layer reading `RUST_LOG` (falling back to `info`). Intended to be
/// called once, near the top of a binary's `main` or a test's setup; harmless (and a no-op) if called more than
/// once within a process.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_roundtrip() {
        set_global_logging_threshold(3);
        assert_eq!(get_global_logging_threshold(), 3);
        assert!(level_enabled(2));
        assert!(level_enabled(3));
        assert!(!level_enabled(4));
        set_global_logging_threshold(1);
    }

    #[test]
    fn macros_compile_and_run() {
        crate::info!("plain message {}", 1);
        crate::debug!(5, "leveled message {}", 2);
    }
}
