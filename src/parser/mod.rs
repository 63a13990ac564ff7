//! Post parsing: comment markup, per-post workers and the batch pipeline.

mod comment;
mod usecase;
mod worker;

pub use comment::{CommentParser, ParsedComment};
pub use usecase::ParsePostsUseCase;
pub use worker::{ParseBatch, PostParseWorker};
