use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

/// Coalesces actions posted within a quiet window; only the last one runs.
#[derive(Default)]
pub struct Debouncer {
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `action` after `delay`, cancelling a still-waiting earlier action.
    pub fn post<F, Fut>(&self, delay: Duration, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action().await;
        });

        let previous = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);

        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn cancel(&self) {
        if let Some(pending) = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pending.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>, value: usize) -> impl FnOnce() -> futures::future::Ready<()> {
        let counter = counter.clone();
        move || {
            counter.store(value, Ordering::SeqCst);
            futures::future::ready(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_action_runs() {
        let debouncer = Debouncer::new();
        let last = Arc::new(AtomicUsize::new(0));

        debouncer.post(Duration::from_millis(500), counting(&last, 1));
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.post(Duration::from_millis(500), counting(&last, 2));
        tokio::time::sleep(Duration::from_millis(100)).await;
        debouncer.post(Duration::from_millis(500), counting(&last, 3));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(last.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(last.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let debouncer = Debouncer::new();
        let last = Arc::new(AtomicUsize::new(0));

        debouncer.post(Duration::from_millis(500), counting(&last, 1));
        debouncer.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(last.load(Ordering::SeqCst), 0);
    }
}
