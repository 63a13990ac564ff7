use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::broadcast;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::config::WatcherConfig;
use crate::domain::ThreadDescriptor;
use crate::manager::BookmarksManager;
use crate::watcher::BookmarkWatcherDelegate;

/// Keeps the watcher alive for one loop and clears `working` when the loop
/// ends. Created before the loop is spawned, so an abort before the first
/// poll still resets the flag.
struct LoopGuard(Arc<BookmarkForegroundWatcher>);

impl Drop for LoopGuard {
    fn drop(&mut self) {
        self.0.working.store(false, Ordering::SeqCst);
    }
}

/// Periodically refreshes active bookmarks while there are any.
///
/// A start request claims the `working` flag before spawning the loop, so at
/// most one update loop exists at a time and requests made while it runs are
/// dropped.
pub struct BookmarkForegroundWatcher {
    config: WatcherConfig,
    enabled: AtomicBool,
    working: AtomicBool,
    bookmarks_manager: Arc<BookmarksManager>,
    delegate: Arc<dyn BookmarkWatcherDelegate>,
    current_loop: Mutex<Option<AbortHandle>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl BookmarkForegroundWatcher {
    /// Spawns the opened-thread listener. Must be called from within a tokio
    /// runtime.
    pub fn new(
        config: WatcherConfig,
        bookmarks_manager: Arc<BookmarksManager>,
        delegate: Arc<dyn BookmarkWatcherDelegate>,
    ) -> Arc<Self> {
        let fetch_events = bookmarks_manager.listen_for_fetch_events();

        let watcher = Arc::new(Self {
            enabled: AtomicBool::new(config.enabled),
            config,
            working: AtomicBool::new(false),
            bookmarks_manager,
            delegate,
            current_loop: Mutex::new(None),
            listener: Mutex::new(None),
        });

        let listener = tokio::spawn(Self::run_opened_thread_listener(
            Arc::downgrade(&watcher),
            fetch_events,
        ));
        *watcher
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(listener);

        watcher
    }

    /// Starts the update loop. Returns `false` when a loop is already running.
    pub fn start_watching(self: &Arc<Self>) -> bool {
        if self
            .working
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Bookmark watch loop already running, start request dropped");
            return false;
        }

        let guard = LoopGuard(self.clone());
        let handle = tokio::spawn(Self::update_loop(guard));
        *self
            .current_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle.abort_handle());
        true
    }

    /// Cancels the running loop at its next await point.
    pub fn stop_watching(&self) {
        if let Some(handle) = self
            .current_loop
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }

    pub fn set_enabled(self: &Arc<Self>, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        if enabled {
            self.start_watching();
        } else {
            self.stop_watching();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    /// Whether an update loop is currently running.
    pub fn is_working(&self) -> bool {
        self.working.load(Ordering::SeqCst)
    }

    pub fn interval_for(&self, active_bookmarks: usize) -> Duration {
        self.config.interval_for(active_bookmarks)
    }

    fn should_keep_working(&self) -> bool {
        self.is_enabled() && self.bookmarks_manager.has_active_bookmarks()
    }

    async fn update_loop(guard: LoopGuard) {
        let this = &guard.0;
        info!("Bookmark watch loop started");

        while this.should_keep_working() {
            let started = tokio::time::Instant::now();
            let outcome = AssertUnwindSafe(this.delegate.do_work(false))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Bookmark update cycle failed: {}", e),
                Err(_) => error!("Bookmark update cycle panicked"),
            }

            if !this.should_keep_working() {
                break;
            }

            let active = this.bookmarks_manager.active_bookmarks_count();
            let interval = this.interval_for(active);
            if this.config.verbose_logs {
                debug!(
                    "Updated {} bookmarks in {:?}, next cycle in {:?}",
                    active,
                    started.elapsed(),
                    interval
                );
            }

            tokio::time::sleep(interval).await;
        }

        debug!("Bookmark watch loop finished");
    }

    async fn run_opened_thread_listener(
        watcher: Weak<Self>,
        mut events: broadcast::Receiver<ThreadDescriptor>,
    ) {
        loop {
            let thread = match events.recv().await {
                Ok(thread) => thread,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} thread fetch events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let Some(this) = watcher.upgrade() else {
                break;
            };

            if this.should_update_opened(&thread) {
                if let Err(e) = this.delegate.do_work(true).await {
                    warn!("Failed to update opened thread {}: {}", thread, e);
                }
            }
        }
    }

    fn should_update_opened(&self, thread: &ThreadDescriptor) -> bool {
        if !self.is_enabled() {
            return false;
        }

        if self.bookmarks_manager.currently_opened_thread().as_ref() != Some(thread) {
            return false;
        }

        self.bookmarks_manager
            .map_bookmark(thread, |bookmark| bookmark.is_active())
            .unwrap_or(false)
    }
}

impl Drop for BookmarkForegroundWatcher {
    fn drop(&mut self) {
        self.stop_watching();
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            listener.abort();
        }
    }
}
