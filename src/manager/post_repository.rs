use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::app::Result;
use crate::domain::{Post, PostDescriptor, ThreadDescriptor};
use crate::sync::SuspendableInitializer;

/// In-memory cache of parsed posts, keyed by thread.
pub struct PostRepository {
    initializer: SuspendableInitializer<()>,
    posts: RwLock<HashMap<ThreadDescriptor, BTreeMap<u64, Post>>>,
}

impl Default for PostRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl PostRepository {
    pub fn new() -> Self {
        Self {
            initializer: SuspendableInitializer::new("PostRepository"),
            posts: RwLock::new(HashMap::new()),
        }
    }

    /// Nothing is loaded from disk; opening the gate is all there is to it.
    pub fn initialize(&self) {
        self.initializer.init_with_value(());
    }

    pub async fn await_until_initialized(&self) -> Result<()> {
        self.initializer.await_until_initialized().await
    }

    /// Inserts or replaces posts and returns how many were not cached before.
    pub fn store_posts(&self, thread: &ThreadDescriptor, posts: Vec<Post>) -> usize {
        let mut cache = self.posts.write().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.entry(thread.clone()).or_default();

        posts
            .into_iter()
            .filter_map(|post| entry.insert(post.post_no(), post).is_none().then_some(()))
            .count()
    }

    /// Posts of a thread in post number order.
    pub fn get_posts(&self, thread: &ThreadDescriptor) -> Vec<Post> {
        self.posts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thread)
            .map(|posts| posts.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn get_post(&self, descriptor: &PostDescriptor) -> Option<Post> {
        self.posts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&descriptor.thread)
            .and_then(|posts| posts.get(&descriptor.post_no))
            .cloned()
    }

    pub fn count(&self, thread: &ThreadDescriptor) -> usize {
        self.posts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thread)
            .map_or(0, BTreeMap::len)
    }

    pub fn clear(&self, thread: &ThreadDescriptor) {
        self.posts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(thread);
    }

    pub fn clear_all(&self) {
        self.posts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
