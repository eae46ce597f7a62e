use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// One cadence entry: after `start_delay` (cumulative from the previous
/// entry), invoke the callback every `frequency`.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    pub start_delay: Duration,
    pub frequency: Duration,
}

/// Invoked with the active frequency and the fire time.
pub type RateCallback = Arc<dyn Fn(Duration, Instant) + Send + Sync>;

enum Command {
    Reset,
}

struct Job {
    commands: mpsc::Sender<Command>,
    handle: JoinHandle<()>,
}

struct Inner {
    callback: RateCallback,
    schedule: Vec<Schedule>,
    job: Option<Job>,
    terminated: bool,
}

/// Invokes a callback at intervals that step through a schedule.
///
/// At most one scheduling task exists at any instant: `run` is a no-op while a
/// task is live or after termination, `reset` rewinds the live task to the
/// first entry, and `terminate` stops the task and waits for it to exit. If
/// the callback outlasts the current frequency the next tick fires immediately
/// on return; missed ticks collapse into one.
pub struct RatedRunner {
    inner: Mutex<Inner>,
}

impl RatedRunner {
    pub fn new(callback: RateCallback, schedule: Vec<Schedule>) -> Result<Self> {
        if schedule.is_empty() {
            return Err(Error::EmptySchedule);
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                callback,
                schedule,
                job: None,
                terminated: false,
            }),
        })
    }

    pub fn run(&self) {
        let mut inner = self.inner.lock();
        if inner.terminated || inner.job.is_some() {
            return;
        }

        let (commands_tx, commands_rx) = mpsc::channel(4);
        let callback = Arc::clone(&inner.callback);
        let schedule = inner.schedule.clone();
        let handle = tokio::spawn(schedule_loop(callback, schedule, commands_rx));

        inner.job = Some(Job {
            commands: commands_tx,
            handle,
        });
    }

    /// Rewinds elapsed time to zero and returns to the first schedule entry
    /// without terminating.
    pub fn reset(&self) {
        let inner = self.inner.lock();
        if let Some(job) = &inner.job {
            let _ = job.commands.try_send(Command::Reset);
        }
    }

    /// Stops the scheduling task and waits for it to fully exit. A terminated
    /// runner cannot be resumed.
    pub async fn terminate(&self) {
        let job = {
            let mut inner = self.inner.lock();
            inner.terminated = true;
            inner.job.take()
        };

        if let Some(job) = job {
            drop(job.commands);
            let _ = job.handle.await;
        }
    }
}

async fn schedule_loop(
    callback: RateCallback,
    schedule: Vec<Schedule>,
    mut commands: mpsc::Receiver<Command>,
) {
    // boundaries[i]: cumulative start delay at which entry i becomes active.
    let mut boundaries = Vec::with_capacity(schedule.len());
    let mut acc = Duration::ZERO;
    for entry in &schedule {
        acc = acc.saturating_add(entry.start_delay);
        boundaries.push(acc);
    }

    let mut base = Instant::now();
    let mut idx = 0usize;
    let mut next_fire = base + boundaries[0] + schedule[0].frequency;

    loop {
        tokio::select! {
            cmd = commands.recv() => match cmd {
                Some(Command::Reset) => {
                    base = Instant::now();
                    idx = 0;
                    next_fire = base + boundaries[0] + schedule[0].frequency;
                }
                None => return,
            },
            _ = tokio::time::sleep_until(next_fire) => {
                let now = Instant::now();

                // A tick that lands on an entry boundary advances the entry
                // instead of firing.
                let mut advanced = false;
                while idx + 1 < schedule.len()
                    && now.duration_since(base) >= boundaries[idx + 1]
                {
                    idx += 1;
                    advanced = true;
                }
                if advanced {
                    next_fire = now + schedule[idx].frequency;
                    continue;
                }

                (callback)(schedule[idx].frequency, now);
                next_fire = now + schedule[idx].frequency;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn counting_runner(schedule: Vec<Schedule>) -> (Arc<AtomicU64>, RatedRunner) {
        let calls = Arc::new(AtomicU64::new(0));
        let callback: RateCallback = {
            let calls = Arc::clone(&calls);
            Arc::new(move |_, _| {
                calls.fetch_add(1, Ordering::Relaxed);
            })
        };
        let runner = RatedRunner::new(callback, schedule).unwrap();
        (calls, runner)
    }

    #[test]
    fn empty_schedules_fail() {
        let callback: RateCallback = Arc::new(|_, _| {});
        assert!(RatedRunner::new(callback, Vec::new()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_a_single_frequency() {
        let (calls, runner) = counting_runner(vec![Schedule {
            start_delay: Duration::from_nanos(1),
            frequency: Duration::from_millis(100),
        }]);

        runner.run();
        tokio::time::sleep(Duration::from_millis(1_050)).await;
        runner.terminate().await;

        assert_eq!(calls.load(Ordering::Relaxed), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn run_twice_keeps_a_single_scheduling_task() {
        let (calls, runner) = counting_runner(vec![Schedule {
            start_delay: Duration::from_nanos(1),
            frequency: Duration::from_millis(100),
        }]);

        runner.run();
        runner.run();
        tokio::time::sleep(Duration::from_millis(550)).await;
        runner.terminate().await;

        assert_eq!(calls.load(Ordering::Relaxed), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn terminated_runners_stay_stopped() {
        let (calls, runner) = counting_runner(vec![Schedule {
            start_delay: Duration::from_nanos(1),
            frequency: Duration::from_millis(10),
        }]);

        runner.run();
        tokio::time::sleep(Duration::from_millis(105)).await;
        runner.terminate().await;
        let after_terminate = calls.load(Ordering::Relaxed);

        runner.run();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::Relaxed), after_terminate);
    }
}
