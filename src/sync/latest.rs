use tokio::sync::watch;

/// "Something changed" notification with overwrite-on-backpressure semantics.
///
/// Producers never block; a slow subscriber wakes once and observes only the
/// most recent version.
pub struct LatestSignal {
    tx: watch::Sender<u64>,
}

impl Default for LatestSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl LatestSignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx }
    }

    pub fn notify(&self) {
        self.tx.send_modify(|version| *version = version.wrapping_add(1));
    }

    pub fn version(&self) -> u64 {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slow_subscriber_sees_only_latest() {
        let signal = LatestSignal::new();
        let mut rx = signal.subscribe();

        signal.notify();
        signal.notify();
        signal.notify();

        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), 3);
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_notify_without_subscribers() {
        let signal = LatestSignal::new();
        signal.notify();
        assert_eq!(signal.version(), 1);
    }
}
