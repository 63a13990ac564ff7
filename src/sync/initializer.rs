use std::fmt::Display;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;

use crate::app::{ChanError, Result};

#[derive(Clone)]
enum InitState<T> {
    Pending,
    Ready(T),
    Failed(Arc<str>),
}

/// One-shot initialization gate. The first `init_with_*` call wins and every
/// current and future waiter observes its outcome.
pub struct SuspendableInitializer<T> {
    tag: &'static str,
    tx: watch::Sender<InitState<T>>,
}

impl<T: Clone + Send + Sync> SuspendableInitializer<T> {
    pub fn new(tag: &'static str) -> Self {
        let (tx, _rx) = watch::channel(InitState::Pending);
        Self { tag, tx }
    }

    pub fn init_with_value(&self, value: T) -> bool {
        self.complete(InitState::Ready(value))
    }

    pub fn init_with_error(&self, error: impl Display) -> bool {
        self.complete(InitState::Failed(Arc::from(error.to_string())))
    }

    pub fn init_with_result(&self, result: Result<T>) -> bool {
        match result {
            Ok(value) => self.init_with_value(value),
            Err(e) => self.init_with_error(e),
        }
    }

    fn complete(&self, outcome: InitState<T>) -> bool {
        let completed = self.tx.send_if_modified(|state| {
            if matches!(state, InitState::Pending) {
                *state = outcome;
                true
            } else {
                false
            }
        });

        if !completed {
            warn!(tag = self.tag, "already initialized, ignoring second initialization");
        }

        completed
    }

    pub fn is_initialized(&self) -> bool {
        matches!(*self.tx.borrow(), InitState::Ready(_))
    }

    /// Resolves once initialization finished, with its value or its error.
    pub async fn await_until_initialized(&self) -> Result<T> {
        let mut rx = self.tx.subscribe();
        let state = rx
            .wait_for(|state| !matches!(state, InitState::Pending))
            .await
            .map_err(|_| ChanError::NotReady(self.tag))?;

        match &*state {
            InitState::Ready(value) => Ok(value.clone()),
            InitState::Failed(message) => Err(ChanError::InitFailed(self.tag, message.to_string())),
            InitState::Pending => Err(ChanError::NotReady(self.tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_waiters_see_value() {
        let init = Arc::new(SuspendableInitializer::<u32>::new("test"));
        assert!(!init.is_initialized());

        let waiter = {
            let init = init.clone();
            tokio::spawn(async move { init.await_until_initialized().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(init.init_with_value(7));

        assert_eq!(waiter.await.unwrap().unwrap(), 7);
        assert!(init.is_initialized());
        assert_eq!(init.await_until_initialized().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_failure_is_observed_by_all() {
        let init = SuspendableInitializer::<()>::new("test");
        assert!(init.init_with_error("catalog missing"));

        let err = init.await_until_initialized().await.unwrap_err();
        assert!(matches!(err, ChanError::InitFailed("test", ref m) if m == "catalog missing"));
        assert!(!init.is_initialized());
    }

    #[tokio::test]
    async fn test_first_outcome_wins() {
        let init = SuspendableInitializer::<u32>::new("test");
        assert!(init.init_with_value(1));
        assert!(!init.init_with_value(2));
        assert!(!init.init_with_error("late"));
        assert_eq!(init.await_until_initialized().await.unwrap(), 1);
    }
}
