use std::sync::Arc;

use tracing::debug;

use crate::app::{ChanError, Result};
use crate::domain::{BoardDescriptor, ChanDescriptor, Post, ThreadDescriptor};
use crate::manager::{BookmarksManager, PostRepository, SiteManager};
use crate::parser::ParsePostsUseCase;
use crate::site::Site;

/// Fetches threads and catalogs, parses them and caches the posts.
pub struct ThreadLoader {
    site_manager: Arc<SiteManager>,
    parse_posts: Arc<ParsePostsUseCase>,
    post_repository: Arc<PostRepository>,
    bookmarks_manager: Arc<BookmarksManager>,
}

impl ThreadLoader {
    pub fn new(
        site_manager: Arc<SiteManager>,
        parse_posts: Arc<ParsePostsUseCase>,
        post_repository: Arc<PostRepository>,
        bookmarks_manager: Arc<BookmarksManager>,
    ) -> Self {
        Self {
            site_manager,
            parse_posts,
            post_repository,
            bookmarks_manager,
        }
    }

    fn site(&self, descriptor: &ChanDescriptor) -> Result<Arc<Site>> {
        self.site_manager
            .by_site_descriptor(descriptor.site())?
            .ok_or_else(|| ChanError::SiteNotFound(descriptor.site().to_string()))
    }

    /// Loads every post of `thread` and returns them in post number order.
    pub async fn load_thread(&self, thread: &ThreadDescriptor) -> Result<Vec<Post>> {
        let descriptor = ChanDescriptor::from(thread.clone());
        let site = self.site(&descriptor)?;

        let builders = site.actions().thread(thread).await.into_result()?;
        let posts = self
            .parse_posts
            .parse_posts(&descriptor, site.reader(), builders, usize::MAX)
            .await?;

        let new_posts = self.post_repository.store_posts(thread, posts);
        debug!("Loaded {} ({} new posts)", thread, new_posts);

        if self.bookmarks_manager.currently_opened_thread().as_ref() == Some(thread) {
            self.bookmarks_manager.on_thread_fetched(thread);
        }

        Ok(self.post_repository.get_posts(thread))
    }

    /// Loads the opening posts of a board's catalog.
    pub async fn load_catalog(&self, board: &BoardDescriptor) -> Result<Vec<Post>> {
        let descriptor = ChanDescriptor::from(board.clone());
        let site = self.site(&descriptor)?;

        let builders = site.actions().catalog(board).await.into_result()?;
        self.parse_posts
            .parse_posts(&descriptor, site.reader(), builders, usize::MAX)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::domain::DescriptorInterner;
    use crate::fetcher::mock::MockFetcher;
    use crate::manager::{BoardManager, FilterEngine};
    use crate::store::{SqliteStore, Store};

    const THREAD: &str = r#"{"posts": [
        {"no": 10, "resto": 0, "sub": "Hello", "com": "first"},
        {"no": 11, "resto": 10, "com": "&gt;&gt;10 hi"}
    ]}"#;

    async fn loader(fetcher: Arc<MockFetcher>) -> (ThreadLoader, Arc<BookmarksManager>, ThreadDescriptor) {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().unwrap());
        let interner = Arc::new(DescriptorInterner::new());

        let site_manager = Arc::new(SiteManager::new(
            interner.clone(),
            store.clone(),
            fetcher,
            Duration::from_millis(500),
        ));
        site_manager.load();
        site_manager.await_until_initialized().await.unwrap();

        let post_repository = Arc::new(PostRepository::new());
        post_repository.initialize();
        let board_manager = Arc::new(BoardManager::new(store.clone()));
        board_manager.load(&[]).unwrap();
        let bookmarks_manager = Arc::new(BookmarksManager::new(interner.clone(), store.clone()));

        let parse_posts = Arc::new(ParsePostsUseCase::new(
            post_repository.clone(),
            board_manager,
            Arc::new(FilterEngine::new(store)),
        ));

        let thread = interner.get_or_create("4chan").board("g").thread(10);
        (
            ThreadLoader::new(site_manager, parse_posts, post_repository, bookmarks_manager.clone()),
            bookmarks_manager,
            thread,
        )
    }

    #[tokio::test]
    async fn test_load_thread_emits_event_for_opened_thread() {
        let fetcher = Arc::new(MockFetcher::new());
        fetcher.respond("https://a.4cdn.org/g/thread/10.json", THREAD);
        let (loader, bookmarks, thread) = loader(fetcher).await;
        let mut events = bookmarks.listen_for_fetch_events();

        bookmarks.set_currently_opened_thread(Some(thread.clone()));
        let posts = loader.load_thread(&thread).await.unwrap();

        assert_eq!(posts.len(), 2);
        assert!(posts[1].replies_to.contains(&10));
        assert_eq!(events.try_recv().unwrap(), thread);
    }

    #[tokio::test]
    async fn test_missing_thread_is_an_error() {
        let (loader, bookmarks, thread) = loader(Arc::new(MockFetcher::new())).await;
        let mut events = bookmarks.listen_for_fetch_events();

        assert!(loader.load_thread(&thread).await.is_err());
        assert!(events.try_recv().is_err());
    }
}
