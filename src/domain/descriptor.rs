//! Value-equal identifiers used as lookup keys throughout the crate.
//!
//! Site descriptors are interned: every [`SiteDescriptor`] is obtained from a
//! [`DescriptorInterner`] owned by the application context, so descriptors with
//! names that differ only in case share a single allocation.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone)]
pub struct SiteDescriptor(Arc<str>);

impl SiteDescriptor {
    pub fn site_name(&self) -> &str {
        &self.0
    }

    /// True when both descriptors point at the same interned instance.
    pub fn ptr_eq(&self, other: &SiteDescriptor) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn is_4chan(&self) -> bool {
        self.0.eq_ignore_ascii_case("4chan")
    }

    pub fn board(&self, board_code: impl Into<String>) -> BoardDescriptor {
        BoardDescriptor::new(self.clone(), board_code)
    }
}

impl PartialEq for SiteDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.0.eq_ignore_ascii_case(&other.0)
    }
}

impl Eq for SiteDescriptor {}

impl Hash for SiteDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for byte in self.0.bytes() {
            state.write_u8(byte.to_ascii_lowercase());
        }
        state.write_u8(0xff);
    }
}

impl fmt::Debug for SiteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SD{{{}}}", self.0)
    }
}

impl fmt::Display for SiteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Get-or-create registry for [`SiteDescriptor`]s keyed by the lowercased name.
#[derive(Default)]
pub struct DescriptorInterner {
    sites: Mutex<HashMap<String, SiteDescriptor>>,
}

impl DescriptorInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, site_name: &str) -> SiteDescriptor {
        let key = site_name.trim().to_ascii_lowercase();
        let mut sites = self.sites.lock().unwrap_or_else(PoisonError::into_inner);

        sites
            .entry(key)
            .or_insert_with(|| SiteDescriptor(Arc::from(site_name.trim())))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sites
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every interned descriptor. Descriptors handed out earlier stay
    /// valid but are no longer identical to ones created afterwards.
    pub fn clear(&self) {
        self.sites
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct BoardDescriptor {
    pub site: SiteDescriptor,
    pub board_code: String,
}

impl BoardDescriptor {
    pub fn new(site: SiteDescriptor, board_code: impl Into<String>) -> Self {
        Self {
            site,
            board_code: board_code.into(),
        }
    }

    pub fn site_name(&self) -> &str {
        self.site.site_name()
    }

    pub fn thread(&self, thread_no: u64) -> ThreadDescriptor {
        ThreadDescriptor::new(self.clone(), thread_no)
    }
}

impl fmt::Debug for BoardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BD{{{}/{}}}", self.site, self.board_code)
    }
}

impl fmt::Display for BoardDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/", self.site, self.board_code)
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ThreadDescriptor {
    pub board: BoardDescriptor,
    pub thread_no: u64,
}

impl ThreadDescriptor {
    pub fn new(board: BoardDescriptor, thread_no: u64) -> Self {
        Self { board, thread_no }
    }

    pub fn site(&self) -> &SiteDescriptor {
        &self.board.site
    }

    pub fn board_code(&self) -> &str {
        &self.board.board_code
    }

    pub fn post(&self, post_no: u64) -> PostDescriptor {
        PostDescriptor {
            thread: self.clone(),
            post_no,
        }
    }
}

impl fmt::Debug for ThreadDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TD{{{}/{}/{}}}",
            self.board.site, self.board.board_code, self.thread_no
        )
    }
}

impl fmt::Display for ThreadDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.board, self.thread_no)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PostDescriptor {
    pub thread: ThreadDescriptor,
    pub post_no: u64,
}

impl PostDescriptor {
    pub fn is_op(&self) -> bool {
        self.thread.thread_no == self.post_no
    }
}

/// Either a single thread or a board's catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChanDescriptor {
    Thread(ThreadDescriptor),
    Catalog(BoardDescriptor),
}

impl ChanDescriptor {
    pub fn board(&self) -> &BoardDescriptor {
        match self {
            ChanDescriptor::Thread(thread) => &thread.board,
            ChanDescriptor::Catalog(board) => board,
        }
    }

    pub fn site(&self) -> &SiteDescriptor {
        &self.board().site
    }

    pub fn thread_no(&self) -> Option<u64> {
        match self {
            ChanDescriptor::Thread(thread) => Some(thread.thread_no),
            ChanDescriptor::Catalog(_) => None,
        }
    }
}

impl From<ThreadDescriptor> for ChanDescriptor {
    fn from(thread: ThreadDescriptor) -> Self {
        ChanDescriptor::Thread(thread)
    }
}

impl From<BoardDescriptor> for ChanDescriptor {
    fn from(board: BoardDescriptor) -> Self {
        ChanDescriptor::Catalog(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_case_differing_names_intern_to_same_instance() {
        let interner = DescriptorInterner::new();
        let lower = interner.get_or_create("4chan");
        let upper = interner.get_or_create("4CHAN");

        assert!(lower.ptr_eq(&upper));
        assert_eq!(lower, upper);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_first_casing_is_kept() {
        let interner = DescriptorInterner::new();
        interner.get_or_create("Lainchan");
        assert_eq!(interner.get_or_create("LAINCHAN").site_name(), "Lainchan");
    }

    #[test]
    fn test_different_names_are_distinct() {
        let interner = DescriptorInterner::new();
        let a = interner.get_or_create("4chan");
        let b = interner.get_or_create("2ch.hk");

        assert_ne!(a, b);
        assert!(!a.ptr_eq(&b));
    }

    #[test]
    fn test_hash_is_case_insensitive() {
        let first = DescriptorInterner::new().get_or_create("Bbwchan");
        let second = DescriptorInterner::new().get_or_create("bbwchan");

        assert!(!first.ptr_eq(&second));

        let mut set = HashSet::new();
        set.insert(first.board("b"));
        assert!(set.contains(&second.board("b")));
    }

    #[test]
    fn test_clear_starts_a_new_generation() {
        let interner = DescriptorInterner::new();
        let before = interner.get_or_create("4chan");
        interner.clear();
        assert!(interner.is_empty());

        let after = interner.get_or_create("4chan");
        assert_eq!(before, after);
        assert!(!before.ptr_eq(&after));
    }

    #[test]
    fn test_chan_descriptor_accessors() {
        let site = DescriptorInterner::new().get_or_create("4chan");
        let thread = site.board("g").thread(123);

        let chan: ChanDescriptor = thread.clone().into();
        assert_eq!(chan.thread_no(), Some(123));
        assert_eq!(chan.board().board_code, "g");
        assert!(thread.post(123).is_op());
        assert!(!thread.post(124).is_op());

        let catalog: ChanDescriptor = site.board("g").into();
        assert_eq!(catalog.thread_no(), None);
    }
}
