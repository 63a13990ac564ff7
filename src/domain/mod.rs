pub mod archive;
pub mod board;
pub mod bookmark;
pub mod descriptor;
pub mod filter;
pub mod page;
pub mod post;
pub mod site;

pub use archive::{ArchiveData, ArchiveDescriptor, ArchiveType};
pub use board::ChanBoard;
pub use bookmark::ThreadBookmark;
pub use descriptor::{
    BoardDescriptor, ChanDescriptor, DescriptorInterner, PostDescriptor, SiteDescriptor,
    ThreadDescriptor,
};
pub use filter::{ChanFilter, FilterAction, FilterType};
pub use page::{BoardPage, BoardPages, ThreadNoTimeModPair};
pub use post::{CrossThreadLink, Post, PostBuilder, PostImage};
pub use site::{ChanSiteData, SiteUserSettings};
