//! # chanwatch
//!
//! A multi-site imageboard client core: site registry, archive catalog,
//! board-page polling, batch post parsing and bookmark watching.
//!
//! ## Architecture
//!
//! ```text
//! Site (4chan | FoolFuuka | Lynxchan) → ChanReader → ParsePostsUseCase → PostRepository
//!                                                  ↘ BookmarkForegroundWatcher → Store
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the configured sites
//! chanwatch sites
//!
//! # Read a thread
//! chanwatch thread 4chan g 12345678
//!
//! # Bookmark it and watch for replies
//! chanwatch bookmark add 4chan g 12345678
//! chanwatch watch
//! ```

/// Application context and error handling.
///
/// [`AppContext`](app::AppContext) owns the store, the fetcher and every
/// manager, and initializes them in dependency order.
pub mod app;

/// Command-line interface using clap.
pub mod cli;

/// Configuration loaded from `~/.config/chanwatch/config.toml`.
pub mod config;

/// Foreground watch daemon with PID file guard.
pub mod daemon;

/// Descriptors, posts, boards, pages, archives, bookmarks and filters.
pub mod domain;

/// HTTP fetching.
///
/// - [`Fetcher`](fetcher::Fetcher): Async trait for raw fetches
/// - [`HttpFetcher`](fetcher::http_fetcher::HttpFetcher): reqwest-based implementation
/// - [`ParallelFetcher`](fetcher::parallel::ParallelFetcher): Concurrent jobs bounded by a semaphore
pub mod fetcher;

/// Registries and caches built on top of the store and the sites.
pub mod manager;

/// Comment parsing and the chunked post-parse pipeline.
pub mod parser;

/// Site implementations and the closed set of supported sites.
pub mod site;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Async coordination primitives shared by the managers.
pub mod sync;

/// Adaptive background refresh of bookmarked threads.
pub mod watcher;
