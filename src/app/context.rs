use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use crate::app::error::{ChanError, Result};
use crate::config::Config;
use crate::domain::{DescriptorInterner, SiteDescriptor};
use crate::fetcher::http_fetcher::HttpFetcher;
use crate::fetcher::parallel::ParallelFetcher;
use crate::fetcher::Fetcher;
use crate::manager::{
    ArchivesManager, BoardManager, BookmarksManager, FilterEngine, PageRequestManager,
    PostRepository, SiteManager, ThreadLoader,
};
use crate::parser::ParsePostsUseCase;
use crate::store::{SqliteStore, Store};
use crate::watcher::{BookmarkForegroundWatcher, BookmarkUpdater};

/// Owns every manager and wires them together.
pub struct AppContext {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub fetcher: Arc<dyn Fetcher + Send + Sync>,
    pub interner: Arc<DescriptorInterner>,
    pub site_manager: Arc<SiteManager>,
    pub board_manager: Arc<BoardManager>,
    pub archives_manager: Arc<ArchivesManager>,
    pub filter_engine: Arc<FilterEngine>,
    pub post_repository: Arc<PostRepository>,
    pub bookmarks_manager: Arc<BookmarksManager>,
    pub page_request_manager: Arc<PageRequestManager>,
    pub parse_posts: Arc<ParsePostsUseCase>,
    pub thread_loader: ThreadLoader,
}

impl AppContext {
    /// Opens the database at `db_path`, or the default data directory
    /// location. Must be called from within a tokio runtime.
    pub fn new(config: Config, db_path: Option<PathBuf>) -> Result<Self> {
        let db_path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let store: Arc<dyn Store> = Arc::new(SqliteStore::new(&db_path)?);
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new(&config.http)?);
        Ok(Self::from_parts(config, store, fetcher))
    }

    pub fn in_memory(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory()?);
        let fetcher: Arc<dyn Fetcher + Send + Sync> = Arc::new(HttpFetcher::new(&config.http)?);
        Ok(Self::from_parts(config, store, fetcher))
    }

    pub fn from_parts(
        config: Config,
        store: Arc<dyn Store>,
        fetcher: Arc<dyn Fetcher + Send + Sync>,
    ) -> Self {
        let interner = Arc::new(DescriptorInterner::new());

        let site_manager = Arc::new(SiteManager::new(
            interner.clone(),
            store.clone(),
            fetcher.clone(),
            config.sites.persist_debounce(),
        ));
        let board_manager = Arc::new(BoardManager::new(store.clone()));
        let archives_manager = Arc::new(ArchivesManager::new());
        let filter_engine = Arc::new(FilterEngine::new(store.clone()));
        let post_repository = Arc::new(PostRepository::new());
        let bookmarks_manager = Arc::new(BookmarksManager::new(interner.clone(), store.clone()));

        let page_request_manager = Arc::new(PageRequestManager::with_intervals(
            site_manager.clone(),
            board_manager.clone(),
            config.pages.update_interval(),
            config.pages.last_page_notify_interval(),
        ));

        let parse_posts = Arc::new(
            ParsePostsUseCase::new(
                post_repository.clone(),
                board_manager.clone(),
                filter_engine.clone(),
            )
            .with_posts_per_batch(config.parser.posts_per_batch)
            .with_verbose_logs(config.watcher.verbose_logs),
        );

        let thread_loader = ThreadLoader::new(
            site_manager.clone(),
            parse_posts.clone(),
            post_repository.clone(),
            bookmarks_manager.clone(),
        );

        Self {
            config,
            store,
            fetcher,
            interner,
            site_manager,
            board_manager,
            archives_manager,
            filter_engine,
            post_repository,
            bookmarks_manager,
            page_request_manager,
            parse_posts,
            thread_loader,
        }
    }

    /// Loads every manager. Site loading runs first since boards are keyed by
    /// site; the rest are independent.
    pub async fn initialize(&self) -> Result<()> {
        self.site_manager.load();
        self.site_manager.await_until_initialized().await?;

        let sites: Vec<SiteDescriptor> = self
            .site_manager
            .site_data_ordered()?
            .into_iter()
            .map(|data| data.site)
            .collect();

        self.board_manager.load(&sites)?;
        self.archives_manager.initialize()?;
        self.post_repository.initialize();
        self.bookmarks_manager.load()?;

        if let Err(e) = self.filter_engine.load() {
            warn!("Filters unavailable, posts will not be filtered: {}", e);
        }

        info!("Initialized {} sites", sites.len());
        Ok(())
    }

    /// Persists state that is otherwise written in the background.
    pub fn flush(&self) -> Result<()> {
        self.site_manager.flush()?;
        self.bookmarks_manager.flush()
    }

    /// Builds a watcher refreshing bookmarks through the configured sites.
    pub fn bookmark_watcher(&self) -> Arc<BookmarkForegroundWatcher> {
        let updater = BookmarkUpdater::new(
            self.site_manager.clone(),
            self.bookmarks_manager.clone(),
            ParallelFetcher::with_workers(self.config.http.max_concurrency),
        )
        .with_verbose_logs(self.config.watcher.verbose_logs);

        BookmarkForegroundWatcher::new(
            self.config.watcher.clone(),
            self.bookmarks_manager.clone(),
            Arc::new(updater),
        )
    }

    fn default_db_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| ChanError::Config("Could not find data directory".into()))?;
        let chanwatch_dir = data_dir.join("chanwatch");
        std::fs::create_dir_all(&chanwatch_dir)?;
        Ok(chanwatch_dir.join("chanwatch.db"))
    }
}
