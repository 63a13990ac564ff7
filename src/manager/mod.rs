//! Long-lived registries and caches shared by the CLI and the watcher.

mod archives_manager;
mod board_manager;
mod bookmarks_manager;
mod filter_engine;
mod page_request_manager;
mod post_repository;
mod site_manager;
mod thread_loader;

pub use archives_manager::ArchivesManager;
pub use board_manager::BoardManager;
pub use bookmarks_manager::BookmarksManager;
pub use filter_engine::{CompiledFilter, FilterEngine};
pub use page_request_manager::PageRequestManager;
pub use post_repository::PostRepository;
pub use site_manager::SiteManager;
pub use thread_loader::ThreadLoader;
