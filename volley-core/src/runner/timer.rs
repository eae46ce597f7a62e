use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Notify;

/// One-shot timer whose expiry can be preempted by an explicit cancel.
///
/// `wait` yields exactly one value: `true` if the timer elapsed, `false` if it
/// was cancelled first. Cancelling is idempotent and safe before or after
/// natural expiry.
#[derive(Debug)]
pub struct CancellableTimer {
    rx: mpsc::Receiver<bool>,
}

#[derive(Debug, Clone)]
pub struct TimerHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellableTimer {
    pub fn new(duration: Duration) -> (Self, TimerHandle) {
        let (tx, rx) = mpsc::channel(1);
        let inner = Arc::new(CancelInner::default());
        let handle = TimerHandle {
            inner: Arc::clone(&inner),
        };

        tokio::spawn(async move {
            let elapsed = tokio::select! {
                _ = tokio::time::sleep(duration) => true,
                _ = wait_cancelled(&inner) => false,
            };
            let _ = tx.send(elapsed).await;
        });

        (Self { rx }, handle)
    }

    pub async fn wait(mut self) -> bool {
        self.rx.recv().await.unwrap_or(false)
    }
}

impl TimerHandle {
    pub fn cancel(&self) {
        if !self.inner.cancelled.swap(true, Ordering::Release) {
            self.inner.notify.notify_waiters();
        }
    }
}

async fn wait_cancelled(inner: &CancelInner) {
    loop {
        let notified = inner.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if inner.cancelled.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }
}
