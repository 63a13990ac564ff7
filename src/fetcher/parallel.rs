use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::app::{ChanError, Result};

pub const DEFAULT_WORKERS: usize = 10;

/// Runs one job per key with bounded concurrency.
pub struct ParallelFetcher {
    semaphore: Arc<Semaphore>,
}

impl Default for ParallelFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ParallelFetcher {
    pub fn new() -> Self {
        Self::with_workers(DEFAULT_WORKERS)
    }

    pub fn with_workers(workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub async fn fetch_all<K, R, F, Fut>(&self, keys: Vec<K>, job: F) -> Vec<(K, Result<R>)>
    where
        K: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(K) -> Fut,
        Fut: Future<Output = Result<R>> + Send + 'static,
    {
        let mut handles = Vec::new();

        for key in keys {
            let semaphore = self.semaphore.clone();
            let task = job(key.clone());

            let handle = tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => task.await,
                    Err(_) => Err(ChanError::Other("worker pool closed".into())),
                };
                (key, result)
            });

            handles.push(handle);
        }

        let mut results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    tracing::error!("Task join error: {}", e);
                }
            }
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let fetcher = ParallelFetcher::with_workers(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = fetcher
            .fetch_all((0..8).collect(), |n: u32| {
                let running = running.clone();
                let peak = peak.clone();
                async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(n * 2)
                }
            })
            .await;

        assert_eq!(results.len(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(results.iter().all(|(n, r)| *r.as_ref().unwrap() == n * 2));
    }

    #[tokio::test]
    async fn test_errors_are_kept_per_key() {
        let fetcher = ParallelFetcher::new();
        let results = fetcher
            .fetch_all(vec![1u32, 2, 3], |n| async move {
                if n == 2 {
                    Err(ChanError::Other("nope".into()))
                } else {
                    Ok(n)
                }
            })
            .await;

        let failed: Vec<u32> = results
            .iter()
            .filter(|(_, r)| r.is_err())
            .map(|(n, _)| *n)
            .collect();
        assert_eq!(failed, vec![2]);
    }
}
