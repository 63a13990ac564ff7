use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::app::{ChanError, Result};
use crate::domain::{FilterAction, Post, PostBuilder};
use crate::manager::CompiledFilter;
use crate::parser::CommentParser;

/// State shared by every worker of one parse call.
pub struct ParseBatch {
    pub internal_ids: HashSet<u64>,
    pub known_boards: HashSet<String>,
    pub filters: Vec<CompiledFilter>,
    pub comment_parser: CommentParser,
    seen: Mutex<HashSet<u64>>,
}

impl ParseBatch {
    pub fn new(
        internal_ids: HashSet<u64>,
        known_boards: HashSet<String>,
        filters: Vec<CompiledFilter>,
        comment_parser: CommentParser,
    ) -> Self {
        Self {
            internal_ids,
            known_boards,
            filters,
            comment_parser,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Claims `post_no` for this batch. Only the first claim succeeds.
    fn claim(&self, post_no: u64) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(post_no)
    }
}

/// Parses a single post builder into a [`Post`].
pub struct PostParseWorker {
    builder: PostBuilder,
    batch: Arc<ParseBatch>,
}

impl PostParseWorker {
    pub fn new(builder: PostBuilder, batch: Arc<ParseBatch>) -> Self {
        Self { builder, batch }
    }

    /// `Ok(None)` when the post is a duplicate or removed by a filter.
    pub fn parse(self) -> Result<Option<Post>> {
        let PostBuilder {
            board,
            post_no,
            op,
            subject,
            name,
            tripcode,
            poster_id,
            comment,
            timestamp,
            images,
            sticky,
            closed,
            archived,
            total_replies,
            thread_images,
            last_modified,
            ..
        } = self.builder.clone();

        let thread = self.builder.thread_descriptor().ok_or_else(|| {
            ChanError::Parse(format!("post {} has no board or thread number", post_no))
        })?;

        if post_no == 0 {
            return Err(ChanError::Parse("post number 0".into()));
        }

        let board_code = board.as_ref().map_or("", |board| board.board_code.as_str());
        let parsed = self.batch.comment_parser.parse(
            &comment,
            post_no,
            board_code,
            &self.batch.internal_ids,
            &self.batch.known_boards,
        );

        let mut filter_hidden = false;
        let mut filter_highlighted = false;
        for compiled in &self.batch.filters {
            if !compiled.matches(&self.builder, &parsed.text) {
                continue;
            }

            match compiled.filter.action {
                FilterAction::Remove => return Ok(None),
                FilterAction::Hide => filter_hidden = true,
                FilterAction::Highlight => filter_highlighted = true,
            }
        }

        if !self.batch.claim(post_no) {
            return Ok(None);
        }

        Ok(Some(Post {
            descriptor: thread.post(post_no),
            op,
            subject,
            name,
            tripcode,
            poster_id,
            comment: parsed.text,
            timestamp,
            images,
            sticky,
            closed,
            archived,
            total_replies,
            thread_images,
            last_modified,
            replies_to: parsed.replies_to,
            cross_thread_links: parsed.cross_thread_links,
            filter_hidden,
            filter_highlighted,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DescriptorInterner;

    fn batch(ids: &[u64]) -> Arc<ParseBatch> {
        Arc::new(ParseBatch::new(
            ids.iter().copied().collect(),
            HashSet::new(),
            Vec::new(),
            CommentParser,
        ))
    }

    #[test]
    fn test_parse_reply() {
        let board = DescriptorInterner::new().get_or_create("4chan").board("g");
        let builder = PostBuilder::new(board, 2)
            .reply_to(1)
            .with_comment("&gt;&gt;1<br>agreed");

        let post = PostParseWorker::new(builder, batch(&[1, 2]))
            .parse()
            .unwrap()
            .unwrap();

        assert_eq!(post.descriptor.thread.thread_no, 1);
        assert_eq!(post.comment, ">>1\nagreed");
        assert!(post.replies_to.contains(&1));
        assert!(!post.op);
    }

    #[test]
    fn test_invalid_builder_fails() {
        let orphan = PostBuilder {
            post_no: 3,
            ..Default::default()
        };
        assert!(PostParseWorker::new(orphan, batch(&[3])).parse().is_err());
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let board = DescriptorInterner::new().get_or_create("4chan").board("g");
        let shared = batch(&[5]);
        let builder = PostBuilder::new(board, 5).as_op();

        assert!(PostParseWorker::new(builder.clone(), shared.clone()).parse().unwrap().is_some());
        assert!(PostParseWorker::new(builder, shared).parse().unwrap().is_none());
    }
}
