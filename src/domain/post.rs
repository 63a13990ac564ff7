use std::collections::BTreeSet;

use crate::domain::{BoardDescriptor, PostDescriptor, ThreadDescriptor};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostImage {
    pub server_filename: String,
    pub original_filename: Option<String>,
    pub extension: Option<String>,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub image_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub spoiler: bool,
}

/// Mutable post representation filled in by a site's reader.
#[derive(Debug, Clone, Default)]
pub struct PostBuilder {
    pub board: Option<BoardDescriptor>,
    pub post_no: u64,
    pub op: bool,
    pub op_no: u64,
    pub subject: Option<String>,
    pub name: Option<String>,
    pub tripcode: Option<String>,
    pub poster_id: Option<String>,
    pub comment: String,
    pub timestamp: i64,
    pub images: Vec<PostImage>,
    pub sticky: bool,
    pub closed: bool,
    pub archived: bool,
    pub total_replies: u32,
    pub thread_images: u32,
    pub last_modified: i64,
}

impl PostBuilder {
    pub fn new(board: BoardDescriptor, post_no: u64) -> Self {
        Self {
            board: Some(board),
            post_no,
            ..Default::default()
        }
    }

    /// Marks this post as the opening post of its own thread.
    pub fn as_op(mut self) -> Self {
        self.op = true;
        self.op_no = self.post_no;
        self
    }

    pub fn reply_to(mut self, op_no: u64) -> Self {
        self.op = false;
        self.op_no = op_no;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn thread_descriptor(&self) -> Option<ThreadDescriptor> {
        let board = self.board.clone()?;
        let thread_no = if self.op { self.post_no } else { self.op_no };

        if thread_no == 0 {
            return None;
        }

        Some(board.thread(thread_no))
    }
}

/// A link from a comment to a post outside the current thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossThreadLink {
    pub board_code: String,
    pub post_no: Option<u64>,
    /// Whether the board is one the site is known to have.
    pub known_board: bool,
}

/// A fully parsed, immutable post.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub descriptor: PostDescriptor,
    pub op: bool,
    pub subject: Option<String>,
    pub name: Option<String>,
    pub tripcode: Option<String>,
    pub poster_id: Option<String>,
    pub comment: String,
    pub timestamp: i64,
    pub images: Vec<PostImage>,
    pub sticky: bool,
    pub closed: bool,
    pub archived: bool,
    pub total_replies: u32,
    pub thread_images: u32,
    pub last_modified: i64,
    pub replies_to: BTreeSet<u64>,
    pub cross_thread_links: Vec<CrossThreadLink>,
    pub filter_hidden: bool,
    pub filter_highlighted: bool,
}

impl Post {
    pub fn post_no(&self) -> u64 {
        self.descriptor.post_no
    }

    pub fn thread(&self) -> &ThreadDescriptor {
        &self.descriptor.thread
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Anonymous")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DescriptorInterner;

    #[test]
    fn test_thread_descriptor_for_op_and_reply() {
        let board = DescriptorInterner::new().get_or_create("4chan").board("g");

        let op = PostBuilder::new(board.clone(), 100).as_op();
        assert_eq!(op.thread_descriptor().unwrap().thread_no, 100);

        let reply = PostBuilder::new(board.clone(), 101).reply_to(100);
        assert_eq!(reply.thread_descriptor().unwrap().thread_no, 100);
    }

    #[test]
    fn test_thread_descriptor_requires_board_and_op() {
        let orphan = PostBuilder {
            post_no: 5,
            op_no: 4,
            ..Default::default()
        };
        assert!(orphan.thread_descriptor().is_none());

        let board = DescriptorInterner::new().get_or_create("4chan").board("g");
        let no_op = PostBuilder::new(board, 5);
        assert!(no_op.thread_descriptor().is_none());
    }
}
