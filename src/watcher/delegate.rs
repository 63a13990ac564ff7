use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::app::{ChanError, Result};
use crate::domain::{PostBuilder, ThreadDescriptor};
use crate::fetcher::parallel::ParallelFetcher;
use crate::manager::{BookmarksManager, SiteManager};
use crate::site::JsonResponse;

/// One update pass over watched bookmarks.
#[async_trait]
pub trait BookmarkWatcherDelegate: Send + Sync {
    /// Updates every active bookmark, or only the currently opened thread's
    /// bookmark when `opened_thread_only` is set.
    async fn do_work(&self, opened_thread_only: bool) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
enum ThreadState {
    Alive {
        title: Option<String>,
        posts: u32,
        last_post_no: u64,
        archived: bool,
        closed: bool,
    },
    Deleted,
}

impl ThreadState {
    fn from_builders(builders: &[PostBuilder]) -> Self {
        let op = builders.iter().find(|builder| builder.op);

        ThreadState::Alive {
            title: op.and_then(|op| op.subject.clone()),
            posts: builders.len() as u32,
            last_post_no: builders.iter().map(|builder| builder.post_no).max().unwrap_or(0),
            archived: op.map_or(false, |op| op.archived),
            closed: op.map_or(false, |op| op.closed),
        }
    }
}

/// Fetches watched threads concurrently and folds the results into bookmarks.
pub struct BookmarkUpdater {
    site_manager: Arc<SiteManager>,
    bookmarks_manager: Arc<BookmarksManager>,
    parallel: ParallelFetcher,
    verbose_logs: bool,
}

impl BookmarkUpdater {
    pub fn new(
        site_manager: Arc<SiteManager>,
        bookmarks_manager: Arc<BookmarksManager>,
        parallel: ParallelFetcher,
    ) -> Self {
        Self {
            site_manager,
            bookmarks_manager,
            parallel,
            verbose_logs: false,
        }
    }

    pub fn with_verbose_logs(mut self, verbose_logs: bool) -> Self {
        self.verbose_logs = verbose_logs;
        self
    }

    fn threads_to_update(&self, opened_thread_only: bool) -> Vec<ThreadDescriptor> {
        if opened_thread_only {
            return self
                .bookmarks_manager
                .currently_opened_thread()
                .filter(|thread| {
                    self.bookmarks_manager
                        .map_bookmark(thread, |bookmark| bookmark.is_active())
                        .unwrap_or(false)
                })
                .into_iter()
                .collect();
        }

        self.bookmarks_manager
            .active_bookmarks()
            .into_iter()
            .map(|bookmark| bookmark.thread)
            .collect()
    }

    async fn fetch_state(site_manager: Arc<SiteManager>, thread: ThreadDescriptor) -> Result<ThreadState> {
        let site = site_manager
            .by_site_descriptor(thread.site())?
            .ok_or_else(|| ChanError::SiteNotFound(thread.site().to_string()))?;

        match site.actions().thread(&thread).await {
            JsonResponse::ServerError(404) => Ok(ThreadState::Deleted),
            response => response
                .into_result()
                .map(|builders| ThreadState::from_builders(&builders)),
        }
    }

    fn apply(&self, thread: &ThreadDescriptor, state: ThreadState) {
        let now = Utc::now();

        self.bookmarks_manager
            .update_bookmarks(std::slice::from_ref(thread), |bookmark| {
                bookmark.last_updated = Some(now);

                match &state {
                    ThreadState::Deleted => bookmark.deleted = true,
                    ThreadState::Alive {
                        title,
                        posts,
                        last_post_no,
                        archived,
                        closed,
                    } => {
                        if bookmark.title.is_none() {
                            bookmark.title = title.clone();
                        }
                        bookmark.total_posts_count = *posts;
                        bookmark.new_posts_count = posts.saturating_sub(bookmark.seen_posts_count);
                        bookmark.archived = *archived;
                        bookmark.closed = *closed;
                        if bookmark.last_viewed_post_no == 0 {
                            bookmark.last_viewed_post_no = *last_post_no;
                        }
                    }
                }
            });
    }
}

#[async_trait]
impl BookmarkWatcherDelegate for BookmarkUpdater {
    async fn do_work(&self, opened_thread_only: bool) -> Result<()> {
        self.site_manager.await_until_initialized().await?;
        self.bookmarks_manager.await_until_initialized().await?;

        let threads = self.threads_to_update(opened_thread_only);
        if threads.is_empty() {
            debug!("No bookmarks to update");
            return Ok(());
        }

        let site_manager = self.site_manager.clone();
        let results = self
            .parallel
            .fetch_all(threads, move |thread| {
                Self::fetch_state(site_manager.clone(), thread)
            })
            .await;

        let mut failed = 0;
        for (thread, result) in &results {
            match result {
                Ok(state) => {
                    if *state == ThreadState::Deleted {
                        info!("Bookmarked thread {} is gone", thread);
                    }
                    self.apply(thread, state.clone());
                }
                Err(e) => {
                    failed += 1;
                    warn!("Failed to update bookmark {}: {}", thread, e);
                }
            }
        }

        if self.verbose_logs {
            debug!(
                "Updated {} bookmarks, {} failed",
                results.len() - failed,
                failed
            );
        }

        Ok(())
    }
}
