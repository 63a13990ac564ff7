use chrono::{DateTime, Utc};

use crate::domain::ThreadDescriptor;

/// A thread tracked for new replies.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadBookmark {
    pub thread: ThreadDescriptor,
    pub title: Option<String>,
    pub watching: bool,
    pub seen_posts_count: u32,
    pub total_posts_count: u32,
    pub last_viewed_post_no: u64,
    pub new_posts_count: u32,
    pub archived: bool,
    pub closed: bool,
    pub deleted: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ThreadBookmark {
    pub fn new(thread: ThreadDescriptor) -> Self {
        Self {
            thread,
            title: None,
            watching: true,
            seen_posts_count: 0,
            total_posts_count: 0,
            last_viewed_post_no: 0,
            new_posts_count: 0,
            archived: false,
            closed: false,
            deleted: false,
            last_updated: None,
        }
    }

    /// Only watched threads that can still receive replies are polled.
    pub fn is_active(&self) -> bool {
        self.watching && !self.archived && !self.closed && !self.deleted
    }

    pub fn mark_seen(&mut self) {
        self.seen_posts_count = self.total_posts_count;
        self.new_posts_count = 0;
    }

    pub fn display_title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| self.thread.to_string())
    }
}
