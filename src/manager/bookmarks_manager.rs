use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info};

use crate::app::{ChanError, Result};
use crate::domain::{DescriptorInterner, ThreadBookmark, ThreadDescriptor};
use crate::store::Store;
use crate::sync::{Debouncer, LatestSignal, SuspendableInitializer};

const FETCH_EVENTS_CAPACITY: usize = 64;
const PERSIST_DEBOUNCE: Duration = Duration::from_millis(250);

/// Bookmarked threads, the currently opened thread and thread fetch events.
pub struct BookmarksManager {
    interner: Arc<DescriptorInterner>,
    store: Arc<dyn Store>,
    initializer: SuspendableInitializer<()>,
    bookmarks: RwLock<Vec<ThreadBookmark>>,
    currently_opened: RwLock<Option<ThreadDescriptor>>,
    fetch_events: broadcast::Sender<ThreadDescriptor>,
    changes: LatestSignal,
    persist_debouncer: Debouncer,
}

impl BookmarksManager {
    /// Must be called from within a tokio runtime.
    pub fn new(interner: Arc<DescriptorInterner>, store: Arc<dyn Store>) -> Self {
        let (fetch_events, _) = broadcast::channel(FETCH_EVENTS_CAPACITY);

        Self {
            interner,
            store,
            initializer: SuspendableInitializer::new("BookmarksManager"),
            bookmarks: RwLock::new(Vec::new()),
            currently_opened: RwLock::new(None),
            fetch_events,
            changes: LatestSignal::new(),
            persist_debouncer: Debouncer::new(),
        }
    }

    pub fn load(&self) -> Result<usize> {
        match self.store.get_all_bookmarks(&self.interner) {
            Ok(bookmarks) => {
                let count = bookmarks.len();
                *self.bookmarks.write().unwrap_or_else(PoisonError::into_inner) = bookmarks;
                self.initializer.init_with_value(());
                info!("Loaded {} bookmarks", count);
                Ok(count)
            }
            Err(e) => {
                self.initializer.init_with_error(&e);
                Err(e)
            }
        }
    }

    pub async fn await_until_initialized(&self) -> Result<()> {
        self.initializer.await_until_initialized().await
    }

    /// Returns `false` when the thread is already bookmarked.
    pub fn add_bookmark(self: &Arc<Self>, thread: &ThreadDescriptor, title: Option<String>) -> bool {
        {
            let mut bookmarks = self.bookmarks.write().unwrap_or_else(PoisonError::into_inner);
            if bookmarks.iter().any(|bookmark| &bookmark.thread == thread) {
                return false;
            }

            let mut bookmark = ThreadBookmark::new(thread.clone());
            bookmark.title = title;
            bookmarks.push(bookmark);
        }

        self.bookmarks_changed();
        true
    }

    pub fn remove_bookmark(&self, thread: &ThreadDescriptor) -> Result<()> {
        let removed = {
            let mut bookmarks = self.bookmarks.write().unwrap_or_else(PoisonError::into_inner);
            let before = bookmarks.len();
            bookmarks.retain(|bookmark| &bookmark.thread != thread);
            before != bookmarks.len()
        };

        if !removed {
            return Err(ChanError::BookmarkNotFound(thread.to_string()));
        }

        self.store.delete_bookmark(thread)?;
        self.changes.notify();
        Ok(())
    }

    /// Flips watching of a bookmark and returns the new state.
    pub fn toggle_watching(self: &Arc<Self>, thread: &ThreadDescriptor) -> Result<bool> {
        let watching = self
            .update_bookmark(thread, |bookmark| {
                bookmark.watching = !bookmark.watching;
                bookmark.watching
            })
            .ok_or_else(|| ChanError::BookmarkNotFound(thread.to_string()))?;

        Ok(watching)
    }

    pub fn exists(&self, thread: &ThreadDescriptor) -> bool {
        self.map_bookmark(thread, |_| ()).is_some()
    }

    pub fn map_bookmark<T, F>(&self, thread: &ThreadDescriptor, mapper: F) -> Option<T>
    where
        F: FnOnce(&ThreadBookmark) -> T,
    {
        self.bookmarks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|bookmark| &bookmark.thread == thread)
            .map(mapper)
    }

    pub fn has_active_bookmarks(&self) -> bool {
        self.bookmarks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(ThreadBookmark::is_active)
    }

    pub fn active_bookmarks_count(&self) -> usize {
        self.bookmarks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|bookmark| bookmark.is_active())
            .count()
    }

    pub fn active_bookmarks(&self) -> Vec<ThreadBookmark> {
        self.bookmarks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|bookmark| bookmark.is_active())
            .cloned()
            .collect()
    }

    pub fn all_bookmarks(&self) -> Vec<ThreadBookmark> {
        self.bookmarks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_bookmark<T, F>(self: &Arc<Self>, thread: &ThreadDescriptor, mutator: F) -> Option<T>
    where
        F: FnOnce(&mut ThreadBookmark) -> T,
    {
        let result = self
            .bookmarks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .iter_mut()
            .find(|bookmark| &bookmark.thread == thread)
            .map(mutator);

        if result.is_some() {
            self.bookmarks_changed();
        }
        result
    }

    /// Applies `mutator` to every bookmark of `threads` and returns how many
    /// bookmarks were found.
    pub fn update_bookmarks<F>(self: &Arc<Self>, threads: &[ThreadDescriptor], mut mutator: F) -> usize
    where
        F: FnMut(&mut ThreadBookmark),
    {
        let updated = {
            let mut bookmarks = self.bookmarks.write().unwrap_or_else(PoisonError::into_inner);
            let mut updated = 0;
            for bookmark in bookmarks.iter_mut() {
                if threads.contains(&bookmark.thread) {
                    mutator(bookmark);
                    updated += 1;
                }
            }
            updated
        };

        if updated > 0 {
            self.bookmarks_changed();
        }
        updated
    }

    pub fn currently_opened_thread(&self) -> Option<ThreadDescriptor> {
        self.currently_opened
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_currently_opened_thread(&self, thread: Option<ThreadDescriptor>) {
        *self
            .currently_opened
            .write()
            .unwrap_or_else(PoisonError::into_inner) = thread;
    }

    pub fn listen_for_fetch_events(&self) -> broadcast::Receiver<ThreadDescriptor> {
        self.fetch_events.subscribe()
    }

    /// Announces that `thread` was just fetched.
    pub fn on_thread_fetched(&self, thread: &ThreadDescriptor) {
        if self.fetch_events.send(thread.clone()).is_err() {
            debug!("No listeners for fetch of {}", thread);
        }
    }

    pub fn listen_for_bookmarks_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn bookmarks_changed(self: &Arc<Self>) {
        self.changes.notify();
        self.persist_bookmarks();
    }

    /// Writes all bookmarks now instead of after the debounce window.
    pub fn flush(&self) -> Result<()> {
        self.persist_debouncer.cancel();
        self.store.upsert_bookmarks(&self.all_bookmarks())
    }

    /// Writes a snapshot of all bookmarks once mutations go quiet. The snapshot
    /// is taken when the write runs, so it always covers the last mutation.
    pub fn persist_bookmarks(self: &Arc<Self>) {
        let this = self.clone();

        self.persist_debouncer.post(PERSIST_DEBOUNCE, move || async move {
            let snapshot = this.all_bookmarks();
            match this.store.upsert_bookmarks(&snapshot) {
                Ok(()) => debug!("Persisted {} bookmarks", snapshot.len()),
                Err(e) => error!("Failed to persist bookmarks: {}", e),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::store::SqliteStore;

    fn manager() -> (Arc<BookmarksManager>, Arc<SqliteStore>, Arc<DescriptorInterner>) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let interner = Arc::new(DescriptorInterner::new());
        let manager = Arc::new(BookmarksManager::new(interner.clone(), store.clone()));
        manager.load().unwrap();
        (manager, store, interner)
    }

    async fn wait_for_persisted(store: &SqliteStore, interner: &DescriptorInterner, count: usize) {
        for _ in 0..100 {
            if store.get_all_bookmarks(interner).unwrap().len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("bookmarks were not persisted");
    }

    #[tokio::test]
    async fn test_add_and_query() {
        let (manager, store, interner) = manager();
        let thread = interner.get_or_create("4chan").board("g").thread(1);

        assert!(manager.add_bookmark(&thread, Some("desktop".into())));
        assert!(!manager.add_bookmark(&thread, None));
        assert!(manager.exists(&thread));
        assert!(manager.has_active_bookmarks());
        assert_eq!(manager.active_bookmarks_count(), 1);
        assert_eq!(
            manager.map_bookmark(&thread, |bookmark| bookmark.display_title()),
            Some("desktop".to_string())
        );

        wait_for_persisted(&store, &interner, 1).await;
    }

    #[tokio::test]
    async fn test_toggle_and_update() {
        let (manager, _, interner) = manager();
        let board = interner.get_or_create("4chan").board("g");
        manager.add_bookmark(&board.thread(1), None);
        manager.add_bookmark(&board.thread(2), None);

        assert!(!manager.toggle_watching(&board.thread(1)).unwrap());
        assert_eq!(manager.active_bookmarks_count(), 1);
        assert!(manager.toggle_watching(&board.thread(3)).is_err());

        let updated = manager.update_bookmarks(&[board.thread(2), board.thread(9)], |bookmark| {
            bookmark.archived = true;
        });
        assert_eq!(updated, 1);
        assert!(!manager.has_active_bookmarks());
    }

    #[tokio::test]
    async fn test_remove_deletes_from_store() {
        let (manager, store, interner) = manager();
        let thread = interner.get_or_create("4chan").board("g").thread(1);
        manager.add_bookmark(&thread, None);
        wait_for_persisted(&store, &interner, 1).await;

        manager.remove_bookmark(&thread).unwrap();
        assert!(store.get_all_bookmarks(&interner).unwrap().is_empty());
        assert!(matches!(
            manager.remove_bookmark(&thread),
            Err(ChanError::BookmarkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_events_and_opened_thread() {
        let (manager, _, interner) = manager();
        let thread = interner.get_or_create("4chan").board("g").thread(1);
        let mut events = manager.listen_for_fetch_events();

        manager.set_currently_opened_thread(Some(thread.clone()));
        assert_eq!(manager.currently_opened_thread(), Some(thread.clone()));

        manager.on_thread_fetched(&thread);
        assert_eq!(events.recv().await.unwrap(), thread);
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_mutations_persists_last_state() {
        let (manager, store, interner) = manager();
        let board = interner.get_or_create("4chan").board("g");
        for no in 1..=5 {
            manager.add_bookmark(&board.thread(no), None);
        }
        manager.toggle_watching(&board.thread(5)).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.get_all_bookmarks(&interner).unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(300)).await;
        let persisted = store.get_all_bookmarks(&interner).unwrap();
        assert_eq!(persisted.len(), 5);
        let last = persisted.iter().find(|bookmark| bookmark.thread == board.thread(5)).unwrap();
        assert!(!last.watching);
    }

    #[tokio::test]
    async fn test_flush_writes_pending_changes() {
        let (manager, store, interner) = manager();
        let thread = interner.get_or_create("4chan").board("g").thread(3);
        manager.add_bookmark(&thread, None);

        manager.flush().unwrap();
        assert_eq!(store.get_all_bookmarks(&interner).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bookmarks_survive_reload() {
        let (manager, store, interner) = manager();
        let thread = interner.get_or_create("4chan").board("g").thread(7);
        manager.add_bookmark(&thread, Some("kept".into()));
        wait_for_persisted(&store, &interner, 1).await;

        let reloaded = BookmarksManager::new(interner.clone(), store);
        reloaded.load().unwrap();
        reloaded.await_until_initialized().await.unwrap();
        assert!(reloaded.exists(&thread));
    }
}
