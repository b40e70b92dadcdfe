//! Watch mode: re-drive a build cycle whenever the bundler re-emits
//!
//! The bundler rewrites its asset manifest after every emitted file is on disk,
//! so a manifest change is the only event that starts a cycle. Bursts of events
//! are coalesced until the directory has been quiet for `DEBOUNCE`.

use crate::signals::ShutdownFlag;
use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(100);
const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Filesystem watcher on the bundler's asset directory
pub struct ManifestWatcher {
    // Dropping the watcher stops event delivery
    _watcher: RecommendedWatcher,
    events: Receiver<Event>,
    manifest_name: OsString,
}

impl ManifestWatcher {
    pub fn new(assets_dir: &Path, manifest_name: &str) -> Result<Self> {
        let (tx, events) = unbounded();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            Config::default(),
        )?;
        watcher.watch(assets_dir, RecursiveMode::NonRecursive)?;

        Ok(Self {
            _watcher: watcher,
            events,
            manifest_name: manifest_name.into(),
        })
    }

    /// Block until a debounced burst touches the manifest.
    ///
    /// Returns false once shutdown is requested or the watcher is gone.
    pub fn wait_for_emit(&self, shutdown: &ShutdownFlag) -> bool {
        while !shutdown.is_requested() {
            let first = match self.events.recv_timeout(SHUTDOWN_POLL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return false,
            };

            let mut touched = self.touches_manifest(&first);
            while let Ok(event) = self.events.recv_timeout(DEBOUNCE) {
                touched |= self.touches_manifest(&event);
            }
            if touched {
                return true;
            }
        }
        false
    }

    fn touches_manifest(&self, event: &Event) -> bool {
        event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(self.manifest_name.as_os_str()))
    }
}

/// Run one cycle for what is already emitted, then one per manifest change,
/// until shutdown is requested. Cycle errors are logged and never end the loop.
pub fn start_watch_loop<F>(
    assets_dir: &Path,
    manifest_name: &str,
    shutdown: &ShutdownFlag,
    mut run_cycle: F,
) -> Result<()>
where
    F: FnMut() -> Result<()>,
{
    let watcher = ManifestWatcher::new(assets_dir, manifest_name)?;
    tracing::info!("watching {} for new builds", assets_dir.display());

    loop {
        if let Err(e) = run_cycle() {
            tracing::warn!("cycle failed: {:#}", e);
        }
        if !watcher.wait_for_emit(shutdown) {
            break;
        }
        tracing::info!("{} changed, starting cycle", manifest_name);
    }

    tracing::info!("watch loop stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{DataChange, ModifyKind};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn modify(paths: &[&str]) -> Event {
        Event {
            kind: notify::EventKind::Modify(ModifyKind::Data(DataChange::Content)),
            paths: paths.iter().map(PathBuf::from).collect(),
            attrs: Default::default(),
        }
    }

    #[test]
    fn test_only_manifest_events_count() {
        let temp_dir = TempDir::new().unwrap();
        let watcher = ManifestWatcher::new(temp_dir.path(), "manifest.json").unwrap();

        assert!(watcher.touches_manifest(&modify(&["dist/a.js", "dist/manifest.json"])));
        assert!(!watcher.touches_manifest(&modify(&["dist/a.js", "dist/manifest.json.tmp"])));
    }

    #[test]
    fn test_requested_shutdown_stops_after_initial_cycle() {
        let temp_dir = TempDir::new().unwrap();
        let shutdown = ShutdownFlag::default();
        shutdown.request();

        let mut cycles = 0;
        start_watch_loop(temp_dir.path(), "manifest.json", &shutdown, || {
            cycles += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(cycles, 1);
    }

    #[test]
    fn test_cycle_error_does_not_end_loop_early() {
        let temp_dir = TempDir::new().unwrap();
        let shutdown = ShutdownFlag::default();
        let stopper = shutdown.clone();

        let result = start_watch_loop(temp_dir.path(), "manifest.json", &shutdown, || {
            stopper.request();
            anyhow::bail!("bundle missing")
        });
        assert!(result.is_ok());
    }
}
