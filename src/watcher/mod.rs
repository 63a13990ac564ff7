//! Background refresh of bookmarked threads.

mod delegate;
mod foreground;

pub use delegate::{BookmarkUpdater, BookmarkWatcherDelegate};
pub use foreground::BookmarkForegroundWatcher;
