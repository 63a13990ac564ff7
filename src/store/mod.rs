pub mod sqlite;

use crate::app::Result;
use crate::domain::{
    ChanBoard, ChanFilter, ChanSiteData, DescriptorInterner, SiteDescriptor, ThreadBookmark,
    ThreadDescriptor,
};

pub use sqlite::SqliteStore;

pub trait Store: Send + Sync {
    // Site operations
    /// Returns a record for every descriptor, creating missing ones at the end
    /// of the current order.
    fn initialize_sites(&self, sites: &[SiteDescriptor]) -> Result<Vec<ChanSiteData>>;
    fn persist_site(&self, site: &ChanSiteData) -> Result<()>;
    fn persist_sites(&self, sites: &[ChanSiteData]) -> Result<()>;

    // Board operations
    fn get_boards(&self, site: &SiteDescriptor) -> Result<Vec<ChanBoard>>;
    fn upsert_boards(&self, boards: &[ChanBoard]) -> Result<usize>;

    // Bookmark operations
    fn get_all_bookmarks(&self, interner: &DescriptorInterner) -> Result<Vec<ThreadBookmark>>;
    fn upsert_bookmarks(&self, bookmarks: &[ThreadBookmark]) -> Result<()>;
    fn delete_bookmark(&self, thread: &ThreadDescriptor) -> Result<bool>;

    // Filter operations
    fn get_all_filters(&self) -> Result<Vec<ChanFilter>>;
    fn add_filter(&self, filter: &ChanFilter) -> Result<i64>;
    fn set_filter_enabled(&self, id: i64, enabled: bool) -> Result<()>;
    fn delete_filter(&self, id: i64) -> Result<()>;
}
