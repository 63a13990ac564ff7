use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, error, warn};

use crate::app::Result;
use crate::domain::{ChanDescriptor, Post, PostBuilder};
use crate::manager::{BoardManager, FilterEngine, PostRepository};
use crate::parser::{ParseBatch, PostParseWorker};
use crate::site::ChanReader;

pub const DEFAULT_POSTS_PER_BATCH: usize = 16;

/// Parses a batch of post builders concurrently, one chunk at a time.
pub struct ParsePostsUseCase {
    post_repository: Arc<PostRepository>,
    board_manager: Arc<BoardManager>,
    filter_engine: Arc<FilterEngine>,
    posts_per_batch: usize,
    verbose_logs: bool,
}

impl ParsePostsUseCase {
    pub fn new(
        post_repository: Arc<PostRepository>,
        board_manager: Arc<BoardManager>,
        filter_engine: Arc<FilterEngine>,
    ) -> Self {
        Self {
            post_repository,
            board_manager,
            filter_engine,
            posts_per_batch: DEFAULT_POSTS_PER_BATCH,
            verbose_logs: false,
        }
    }

    pub fn with_posts_per_batch(mut self, posts_per_batch: usize) -> Self {
        self.posts_per_batch = posts_per_batch.max(1);
        self
    }

    pub fn with_verbose_logs(mut self, verbose_logs: bool) -> Self {
        self.verbose_logs = verbose_logs;
        self
    }

    /// Parses up to `max_count` of `builders`. Posts that fail to parse are
    /// logged and left out; the rest keep their input order.
    pub async fn parse_posts(
        &self,
        descriptor: &ChanDescriptor,
        reader: Arc<dyn ChanReader>,
        builders: Vec<PostBuilder>,
        max_count: usize,
    ) -> Result<Vec<Post>> {
        self.post_repository.await_until_initialized().await?;
        self.board_manager.await_until_initialized().await?;

        if builders.is_empty() || max_count == 0 {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let board = descriptor.board();
        let filters = self.filter_engine.compiled_for_board(board);

        let known_boards: HashSet<String> = match descriptor {
            ChanDescriptor::Thread(_) => self
                .board_manager
                .board_descriptors_for_site(descriptor.site())
                .into_iter()
                .map(|board| board.board_code)
                .collect(),
            ChanDescriptor::Catalog(_) => HashSet::new(),
        };

        let input_count = builders.len().min(max_count);
        let mut builders = builders;
        builders.truncate(input_count);

        let internal_ids: HashSet<u64> = builders.iter().map(|builder| builder.post_no).collect();
        let batch = Arc::new(ParseBatch::new(
            internal_ids,
            known_boards,
            filters,
            reader.comment_parser(),
        ));

        let mut parsed = Vec::with_capacity(input_count);
        let mut remaining = builders.into_iter().peekable();

        while remaining.peek().is_some() {
            let handles: Vec<_> = remaining
                .by_ref()
                .take(self.posts_per_batch)
                .map(|builder| {
                    let post_no = builder.post_no;
                    let worker = PostParseWorker::new(builder, batch.clone());
                    (post_no, tokio::spawn(async move { worker.parse() }))
                })
                .collect();

            let (numbers, tasks): (Vec<u64>, Vec<_>) = handles.into_iter().unzip();

            for (post_no, outcome) in numbers.into_iter().zip(join_all(tasks).await) {
                match outcome {
                    Ok(Ok(Some(post))) => parsed.push(post),
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => warn!("Failed to parse post {} of {:?}: {}", post_no, descriptor, e),
                    Err(e) => error!("Parse task for post {} of {:?} died: {}", post_no, descriptor, e),
                }
            }
        }

        if self.verbose_logs {
            debug!(
                "Parsed {} of {} posts of {:?} in {:?}",
                parsed.len(),
                input_count,
                descriptor,
                started.elapsed()
            );
        }

        Ok(parsed)
    }
}
