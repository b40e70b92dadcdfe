//! Shutdown on SIGINT, SIGTERM and SIGQUIT
//!
//! The first signal sets a flag that the watch loop polls between cycles, so the
//! runner is released before exit. A second signal while the flag is already set
//! exits the process at once with status 130, which covers a runner phase that
//! never returns.

use signal_hook::consts::TERM_SIGNALS;
use signal_hook::flag;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Exit status used when a second signal forces termination
const FORCED_EXIT: i32 = 130;

/// Shared shutdown request, cheap to clone into the watch loop
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    /// Register the flag for every terminating signal.
    ///
    /// The conditional shutdown is registered first so that it only fires when
    /// an earlier signal already set the flag.
    pub fn install() -> std::io::Result<Self> {
        let shutdown = Self::default();
        for &sig in TERM_SIGNALS {
            flag::register_conditional_shutdown(sig, FORCED_EXIT, Arc::clone(&shutdown.0))?;
            flag::register(sig, Arc::clone(&shutdown.0))?;
        }
        tracing::debug!("installed handlers for {} signals", TERM_SIGNALS.len());
        Ok(shutdown)
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[inline]
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let shutdown = ShutdownFlag::default();
        let observer = shutdown.clone();
        assert!(!observer.is_requested());

        shutdown.request();
        assert!(observer.is_requested());
    }
}
