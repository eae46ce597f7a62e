use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// Latch the embedder trips to request a graceful drain. Tripping it again has
/// no further effect on the engine.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    fired: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shutdown(&self) {
        self.fired.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_shutdown(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.fired.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn wait_resolves_after_shutdown() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            tokio::spawn(async move { signal.wait().await })
        };

        tokio::task::yield_now().await;
        assert!(!signal.is_shutdown());
        signal.shutdown();
        waiter.await.unwrap();
        assert!(signal.is_shutdown());

        // Already-fired signals resolve immediately.
        signal.wait().await;
    }
}
