//! Unrecoverable invariant violations
//!
//! Stack pool underflow and exit-with-nothing-active mean the pool's
//! bookkeeping is already wrong. Both route through [`fatal`], which logs
//! the diagnostic and terminates the process. No cleanup is attempted.
//!
//! # Environment Variables
//!
//! - `COTASK_FATAL=abort|panic` - Terminate with `abort` (default) or unwind
//!   with a panic carrying the diagnostic (used by tests and hosts that
//!   install their own panic handling)

use core::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Once;

/// How a fatal violation terminates
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalMode {
    /// `std::process::abort()` after logging
    Abort = 0,
    /// `panic!` with the diagnostic as the message
    Panic = 1,
}

static MODE: AtomicU8 = AtomicU8::new(FatalMode::Abort as u8);
static INIT: Once = Once::new();

/// Read `COTASK_FATAL` once; callers block until the env value is stored
fn init() {
    INIT.call_once(|| {
        if let Some(val) = crate::env::env_get_opt::<String>("COTASK_FATAL") {
            if val.eq_ignore_ascii_case("panic") {
                MODE.store(FatalMode::Panic as u8, Ordering::SeqCst);
            }
        }
    });
}

/// Current fatal mode
pub fn mode() -> FatalMode {
    init();
    match MODE.load(Ordering::SeqCst) {
        1 => FatalMode::Panic,
        _ => FatalMode::Abort,
    }
}

/// Override the fatal mode (wins over `COTASK_FATAL`)
pub fn set_mode(mode: FatalMode) {
    init();
    MODE.store(mode as u8, Ordering::SeqCst);
}

/// Report an invariant violation and terminate
#[cold]
#[inline(never)]
pub fn fatal(args: fmt::Arguments<'_>) -> ! {
    crate::kerror!("fatal: {}", args);
    match mode() {
        FatalMode::Panic => panic!("{}", args),
        FatalMode::Abort => std::process::abort(),
    }
}

/// Report an invariant violation and terminate
///
/// ```ignore
/// if self.free.len() == self.capacity {
///     fatal!("stack pool underflow");
/// }
/// ```
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::fatal::fatal(format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "invariant broken: 3")]
    fn test_fatal_panics_in_panic_mode() {
        set_mode(FatalMode::Panic);
        crate::fatal!("invariant broken: {}", 3);
    }

    #[test]
    fn test_set_mode() {
        set_mode(FatalMode::Panic);
        assert_eq!(mode(), FatalMode::Panic);
    }

    #[test]
    fn test_set_mode_not_overwritten_by_concurrent_init() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        set_mode(FatalMode::Panic);
                        assert_eq!(mode(), FatalMode::Panic);
                    } else {
                        let _ = mode();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(mode(), FatalMode::Panic);
    }
}
