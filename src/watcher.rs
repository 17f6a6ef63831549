//! Recursive filesystem watching for out-of-band changes.
//!
//! Events funnel through one callback that marks the affected caches stale;
//! invalidators are idempotent, so duplicate events are harmless. Rename
//! events are ignored: renames are owned by the rename command.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

use crate::error::CardoError;

/// Callback invoked with each changed path.
pub type InvalidateFn = Box<dyn Fn(&Path) + Send>;

enum BackendWatcher {
    Recommended(RecommendedWatcher),
    Poll(PollWatcher),
}

/// Watches a project tree and routes changes into cache invalidation.
pub struct ContentWatcher {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    // Dropped with the watcher; keeps the backend subscription alive.
    _backend: BackendWatcher,
}

impl ContentWatcher {
    /// Start watching `root` recursively.
    ///
    /// Falls back to a periodic re-scan backend when the platform's native
    /// watcher cannot be created; the invalidation contract is the same.
    pub fn start(root: &Path, invalidate: InvalidateFn) -> Result<Self, CardoError> {
        let (tx, rx) = channel::<Result<Event, notify::Error>>();

        let backend = match RecommendedWatcher::new(
            {
                let tx = tx.clone();
                move |event| {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        ) {
            Ok(mut watcher) => {
                watcher
                    .watch(root, RecursiveMode::Recursive)
                    .map_err(|e| CardoError::WatcherFailed(e.to_string()))?;
                BackendWatcher::Recommended(watcher)
            }
            Err(first_error) => {
                debug!(%first_error, "native watcher unavailable, falling back to polling");
                let mut watcher = PollWatcher::new(
                    move |event| {
                        let _ = tx.send(event);
                    },
                    notify::Config::default().with_poll_interval(Duration::from_secs(2)),
                )
                .map_err(|e| CardoError::WatcherFailed(e.to_string()))?;
                watcher
                    .watch(root, RecursiveMode::Recursive)
                    .map_err(|e| CardoError::WatcherFailed(e.to_string()))?;
                BackendWatcher::Poll(watcher)
            }
        };

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let thread = std::thread::spawn(move || {
            while thread_running.load(Ordering::SeqCst) {
                match rx.recv_timeout(Duration::from_millis(200)) {
                    Ok(Ok(event)) => {
                        if !relevant(&event.kind) {
                            continue;
                        }
                        for path in event.paths {
                            invalidate(&path);
                        }
                    }
                    Ok(Err(error)) => {
                        // A failing backend closes the watcher.
                        warn!(%error, "content watcher failed, stopping");
                        thread_running.store(false, Ordering::SeqCst);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => {
                        thread_running.store(false, Ordering::SeqCst);
                    }
                }
            }
        });

        Ok(Self { running, thread: Some(thread), _backend: backend })
    }

    /// Signal the watcher to stop and wait for its thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for ContentWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create/modify/remove matter; renames are owned by the rename command and
/// access events are noise.
fn relevant(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) | EventKind::Remove(_) => true,
        EventKind::Modify(modify) => !matches!(modify, notify::event::ModifyKind::Name(_)),
        _ => false,
    }
}
