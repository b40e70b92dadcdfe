//! Resource Cleanup
//!
//! - **ProcessTracker**: RAII record of spawned runner processes, killed on Drop
//! - **CleanupCoordinator**: releases runner resources at most once per lifecycle
//!
//! Mutex poison is ignored throughout: cleanup has to work even after a panic
//! while a lock was held.

use crate::error::Phase;
use crate::runner::Runner;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Tracks runner child processes so they can be killed on any exit path.
///
/// Children are spawned as process-group leaders, so killing `-pid` also takes
/// down browsers and drivers they started.
pub struct ProcessTracker {
    pids: Mutex<Vec<i32>>,
}

impl ProcessTracker {
    pub fn new() -> Self {
        Self {
            pids: Mutex::new(Vec::new()),
        }
    }

    pub fn track(&self, pid: i32) {
        let mut pids = self.pids.lock().unwrap_or_else(|e| e.into_inner());
        pids.push(pid);
    }

    /// Forget a process that exited on its own
    pub fn untrack(&self, pid: i32) {
        let mut pids = self.pids.lock().unwrap_or_else(|e| e.into_inner());
        pids.retain(|&p| p != pid);
    }

    pub fn pids(&self) -> Vec<i32> {
        let pids = self.pids.lock().unwrap_or_else(|e| e.into_inner());
        pids.clone()
    }

    /// SIGKILL every tracked process group and forget them. Returns how many were signalled.
    pub fn kill_all(&self) -> usize {
        let mut pids = self.pids.lock().unwrap_or_else(|e| e.into_inner());
        let count = pids.len();

        for &pid in pids.iter() {
            if pid > 0 {
                let _ = kill(Pid::from_raw(-pid), Signal::SIGKILL);
                let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
            }
        }
        pids.clear();
        count
    }
}

impl Drop for ProcessTracker {
    fn drop(&mut self) {
        let killed = self.kill_all();
        if killed > 0 {
            tracing::debug!("killed {} leftover runner processes", killed);
        }
    }
}

impl Default for ProcessTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases runner resources exactly once.
///
/// Release failures are logged and otherwise treated like success: the
/// pipeline carries on to exit either way.
pub struct CleanupCoordinator {
    released: AtomicBool,
}

impl CleanupCoordinator {
    pub fn new() -> Self {
        Self {
            released: AtomicBool::new(false),
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Close the runner unless that already happened. Returns `true` if this call closed it.
    pub async fn release<R: Runner + ?Sized>(&self, runner: &mut R) -> bool {
        if self.released.swap(true, Ordering::SeqCst) {
            return false;
        }

        match runner.close().await {
            Ok(()) => tracing::debug!("runner resources released"),
            Err(e) => tracing::warn!("{} phase failed: {}", Phase::Close, e),
        }
        true
    }
}

impl Default for CleanupCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BridgeError, Result};
    use crate::runner::RunnerContext;
    use async_trait::async_trait;

    #[derive(Default)]
    struct CloseCounter {
        closes: usize,
        fail: bool,
    }

    #[async_trait]
    impl Runner for CloseCounter {
        async fn setup_overrides(&mut self, _ctx: &RunnerContext) -> Result<()> {
            Ok(())
        }
        async fn load_plugins(&mut self, _ctx: &RunnerContext) -> Result<()> {
            Ok(())
        }
        async fn configure(&mut self, _ctx: &RunnerContext) -> Result<()> {
            Ok(())
        }
        async fn prepare(&mut self, _ctx: &RunnerContext) -> Result<()> {
            Ok(())
        }
        async fn run_tests(&mut self, _ctx: &RunnerContext) -> Result<()> {
            Ok(())
        }
        async fn close(&mut self) -> Result<()> {
            self.closes += 1;
            if self.fail {
                return Err(BridgeError::phase(Phase::Close, "socket already gone"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_tracker_creation() {
        let tracker = ProcessTracker::new();
        assert!(tracker.pids().is_empty());
    }

    #[test]
    fn test_track_untrack() {
        let tracker = ProcessTracker::default();
        tracker.track(1234);
        tracker.track(5678);
        assert_eq!(tracker.pids().len(), 2);

        tracker.untrack(1234);
        assert_eq!(tracker.pids(), vec![5678]);

        tracker.untrack(999);
        assert_eq!(tracker.pids().len(), 1);
    }

    #[test]
    fn test_kill_all_ignores_non_positive() {
        let tracker = ProcessTracker::new();
        tracker.track(0);
        tracker.track(-1);
        assert_eq!(tracker.kill_all(), 2);
        assert!(tracker.pids().is_empty());
    }

    #[tokio::test]
    async fn test_release_once() {
        let coordinator = CleanupCoordinator::new();
        let mut runner = CloseCounter::default();

        assert!(!coordinator.is_released());
        assert!(coordinator.release(&mut runner).await);
        assert!(!coordinator.release(&mut runner).await);
        assert!(coordinator.is_released());
        assert_eq!(runner.closes, 1);
    }

    #[tokio::test]
    async fn test_release_failure_still_counts() {
        let coordinator = CleanupCoordinator::default();
        let mut runner = CloseCounter {
            fail: true,
            ..Default::default()
        };

        assert!(coordinator.release(&mut runner).await);
        assert!(coordinator.is_released());
        assert_eq!(runner.closes, 1);
    }
}
