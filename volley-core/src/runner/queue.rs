use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

/// Claim-based dispatch of iteration numbers to workers.
///
/// The dispatcher authorizes sequential iteration numbers with `push`; workers
/// race to `claim` them. Closing the queue wakes every claimant; claims after
/// close return `None` even if authorized numbers remain unclaimed, so workers
/// finish only the iteration they already hold.
#[derive(Debug, Default)]
pub struct WorkQueue {
    /// Highest authorized iteration number.
    queued: AtomicU64,
    /// Highest claimed iteration number.
    claimed: AtomicU64,
    closed: AtomicBool,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authorizes `iteration` for dispatch. Numbers must be pushed in
    /// ascending order; the single dispatcher guarantees this.
    pub fn push(&self, iteration: u64) {
        self.queued.store(iteration, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Authorized-but-unclaimed numbers; meaningful once workers have exited.
    pub fn unclaimed(&self) -> u64 {
        let queued = self.queued.load(Ordering::Acquire);
        let claimed = self.claimed.load(Ordering::Acquire);
        queued.saturating_sub(claimed)
    }

    pub async fn claim(&self) -> Option<u64> {
        loop {
            if self.closed.load(Ordering::Acquire) {
                return None;
            }

            let claimed = self.claimed.load(Ordering::Acquire);
            let queued = self.queued.load(Ordering::Acquire);
            if claimed < queued {
                if self
                    .claimed
                    .compare_exchange_weak(
                        claimed,
                        claimed + 1,
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    return Some(claimed + 1);
                }
                continue;
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            // Re-check after registering so a concurrent push or close cannot
            // be missed.
            if self.closed.load(Ordering::Acquire)
                || self.claimed.load(Ordering::Acquire) < self.queued.load(Ordering::Acquire)
            {
                continue;
            }
            notified.await;
        }
    }

    /// Resolves once the queue is closed; used as the stop broadcast.
    pub async fn wait_closed(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.closed.load(Ordering::Acquire) {
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
    async fn claims_come_out_in_order() {
        let queue = WorkQueue::new();
        queue.push(1);
        queue.push(2);
        assert_eq!(queue.claim().await, Some(1));
        assert_eq!(queue.claim().await, Some(2));
    }

    #[tokio::test]
    async fn close_wakes_blocked_claimants() {
        let queue = Arc::new(WorkQueue::new());
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.claim().await })
        };

        tokio::task::yield_now().await;
        queue.close();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn claims_after_close_drain_nothing() {
        let queue = WorkQueue::new();
        queue.push(1);
        queue.close();
        assert_eq!(queue.claim().await, None);
        assert_eq!(queue.unclaimed(), 1);
    }

    #[tokio::test]
    async fn concurrent_claimants_never_share_a_number() {
        let queue = Arc::new(WorkQueue::new());
        for n in 1..=100u64 {
            queue.push(n);
        }

        let mut handles = Vec::new();
        for _ in 0..8 {
            let queue = Arc::clone(&queue);
            handles.push(tokio::spawn(async move {
                let mut mine = Vec::new();
                while let Some(n) = queue.claim().await {
                    mine.push(n);
                    if queue.unclaimed() == 0 {
                        queue.close();
                    }
                }
                mine
            }));
        }

        let mut all = Vec::new();
        for h in handles {
            all.extend(h.await.unwrap());
        }
        all.sort_unstable();
        assert_eq!(all, (1..=100).collect::<Vec<_>>());
    }
}
