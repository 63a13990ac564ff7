use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{error, trace};

use crate::app::Result;

type SerializedAction = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Executes posted actions sequentially on a single background task.
///
/// A post is accepted only while the worker is idle. The idle permit travels
/// with the action and is released once the action completes, so every post
/// made while an action runs is discarded and nothing is ever queued.
pub struct RendezvousExecutor {
    tag: &'static str,
    idle: Arc<Semaphore>,
    tx: mpsc::Sender<(OwnedSemaphorePermit, SerializedAction)>,
}

impl RendezvousExecutor {
    /// Spawns the worker. Must be called from within a tokio runtime.
    pub fn new(tag: &'static str) -> Self {
        let (tx, mut rx) = mpsc::channel::<(OwnedSemaphorePermit, SerializedAction)>(1);

        tokio::spawn(async move {
            while let Some((_idle, action)) = rx.recv().await {
                let outcome = AssertUnwindSafe(async move { action().await })
                    .catch_unwind()
                    .await;

                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => error!(tag, "serialized action failed: {}", e),
                    Err(_) => error!(tag, "serialized action panicked"),
                }
            }

            trace!(tag, "rendezvous executor stopped");
        });

        Self {
            tag,
            idle: Arc::new(Semaphore::new(1)),
            tx,
        }
    }

    /// Offers an action to the worker. Returns `false` when it was discarded.
    pub fn post<F, Fut>(&self, action: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let Ok(idle) = self.idle.clone().try_acquire_owned() else {
            trace!(tag = self.tag, "worker busy, action discarded");
            return false;
        };

        let action: SerializedAction = Box::new(move || action().boxed());
        if self.tx.try_send((idle, action)).is_err() {
            trace!(tag = self.tag, "worker stopped, action discarded");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ChanError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{oneshot, Notify};

    #[tokio::test]
    async fn test_posts_while_busy_are_discarded() {
        let executor = RendezvousExecutor::new("test");
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());
        let (started_tx, started_rx) = oneshot::channel();

        {
            let runs = runs.clone();
            let release = release.clone();
            assert!(executor.post(move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                let _ = started_tx.send(());
                release.notified().await;
                Ok(())
            }));
        }
        started_rx.await.unwrap();

        let accepted = (0..10)
            .filter(|_| {
                let runs = runs.clone();
                executor.post(move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            })
            .count();
        assert_eq!(accepted, 0);

        release.notify_one();
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let runs_after = runs.clone();
        assert!(executor.post(move || async move {
            runs_after.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }));
        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    async fn panicking() -> Result<()> {
        panic!("worker panic")
    }

    async fn post_until_accepted(executor: &RendezvousExecutor, done: Arc<Notify>) {
        loop {
            let done = done.clone();
            if executor.post(move || async move {
                done.notify_one();
                Ok(())
            }) {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_worker_survives_errors_and_panics() {
        let executor = RendezvousExecutor::new("test");

        assert!(executor.post(|| async { Err(ChanError::Other("boom".into())) }));
        while !executor.post(panicking) {
            tokio::task::yield_now().await;
        }

        let done = Arc::new(Notify::new());
        post_until_accepted(&executor, done.clone()).await;
        done.notified().await;
    }
}
