mod constant;
mod distribution;
mod file;
mod jitter;
mod rate;
mod schedule;
mod staged;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::error::Result;

pub use constant::{constant_rates, parse_rate};
pub use distribution::{distribute, Distribution};
pub use file::{parse_stage_file, FileOptions, RunnableStage, StageMode, StageParams};
pub use jitter::with_jitter;
pub use rate::{RateFn, Rates};
pub use schedule::{Stage, StageSchedule};
pub use staged::{parse_stages, staged_rates};

/// A long-running producer of "fire now" signals. The execution core owns the
/// channels; the trigger only decides *when* to emit and never enforces caps.
pub struct Trigger {
    pub source: TriggerSource,
    pub description: String,
    /// Total intended run time; `Duration::ZERO` means unbounded.
    pub duration: Duration,
    /// Parameters of the active stage (file triggers only; empty otherwise).
    pub stage_params: Arc<StageParams>,
}

impl Trigger {
    /// Fires `rate` times per window, forever.
    pub fn constant(rate_spec: &str, distribution: Distribution, jitter: f64) -> Result<Self> {
        let rates = constant_rates(rate_spec, distribution, jitter)?;
        Ok(Self {
            description: format!(
                "{rate_spec} iterations, {distribution} distribution"
            ),
            duration: rates.duration,
            source: TriggerSource::Windowed {
                iteration_duration: rates.iteration_duration,
                rate: rates.rate,
            },
            stage_params: Arc::new(StageParams::default()),
        })
    }

    /// Fires at rates ramping through `stages_spec`, one evaluation per
    /// `frequency` window.
    pub fn staged(
        stages_spec: &str,
        frequency: Duration,
        distribution: Distribution,
        jitter: f64,
    ) -> Result<Self> {
        let rates = staged_rates(stages_spec, frequency, distribution, jitter)?;
        Ok(Self {
            description: format!(
                "iterations every {frequency:?} in numbers varying by time: {stages_spec}, {distribution} distribution"
            ),
            duration: rates.duration,
            source: TriggerSource::Windowed {
                iteration_duration: rates.iteration_duration,
                rate: rates.rate,
            },
            stage_params: Arc::new(StageParams::default()),
        })
    }

    /// Walks the pre-parsed stages of a YAML stage file. Also returns the run
    /// option overrides the file carries.
    pub fn from_stage_file(contents: &str) -> Result<(Self, FileOptions)> {
        let (stages, options) = parse_stage_file(contents)?;
        let duration = stages
            .iter()
            .fold(Duration::ZERO, |acc, s| acc.saturating_add(s.duration));
        let params = Arc::new(StageParams::default());

        let trigger = Self {
            description: format!("{} different stages", stages.len()),
            duration,
            source: TriggerSource::Stages {
                stages,
                params: Arc::clone(&params),
            },
            stage_params: params,
        };
        Ok((trigger, options))
    }
}

pub enum TriggerSource {
    /// Evaluate a rate function once per fixed window and emit that many
    /// signals.
    Windowed {
        iteration_duration: Duration,
        rate: RateFn,
    },
    /// Walk runnable stages, advancing on stage-duration expiry; `Users`
    /// stages pace against completions read from `work_done`.
    Stages {
        stages: Vec<RunnableStage>,
        params: Arc<StageParams>,
    },
}

impl TriggerSource {
    /// Emits one value on `work` per iteration to dispatch. Returns when a
    /// value arrives on `stop` or when either peer channel closes.
    pub async fn run(
        self,
        work: mpsc::Sender<()>,
        mut stop: mpsc::Receiver<()>,
        mut done: mpsc::Receiver<bool>,
    ) {
        match self {
            TriggerSource::Windowed {
                iteration_duration,
                rate,
            } => {
                let started = Instant::now();
                let period = iteration_duration.max(Duration::from_millis(1));
                let mut interval = tokio::time::interval_at(started + period, period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = stop.recv() => return,
                        maybe = done.recv() => {
                            if maybe.is_none() {
                                return;
                            }
                        }
                        _ = interval.tick() => {
                            let n = rate(started.elapsed());
                            for _ in 0..n {
                                if !send_or_stop(&work, &mut stop).await {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
            TriggerSource::Stages { stages, params } => {
                let mut in_flight: u64 = 0;

                'stages: for stage in stages {
                    params.replace(stage.parameters.clone());

                    let stage_started = Instant::now();
                    let period = stage.tick.max(Duration::from_millis(1));
                    let mut interval = tokio::time::interval_at(stage_started + period, period);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

                    // Users stages top up immediately on entry.
                    if let StageMode::Users { concurrency } = &stage.mode {
                        while in_flight < *concurrency {
                            if !send_or_stop(&work, &mut stop).await {
                                return;
                            }
                            in_flight += 1;
                        }
                    }

                    loop {
                        tokio::select! {
                            _ = stop.recv() => return,
                            maybe = done.recv() => {
                                if maybe.is_none() {
                                    return;
                                }
                                in_flight = in_flight.saturating_sub(1);
                                if let StageMode::Users { concurrency } = &stage.mode {
                                    if in_flight < *concurrency {
                                        if !send_or_stop(&work, &mut stop).await {
                                            return;
                                        }
                                        in_flight += 1;
                                    }
                                }
                            }
                            _ = interval.tick() => {
                                if stage_started.elapsed() >= stage.duration {
                                    continue 'stages;
                                }
                                match &stage.mode {
                                    StageMode::Rate { rate } => {
                                        let n = rate(stage_started.elapsed());
                                        for _ in 0..n {
                                            if !send_or_stop(&work, &mut stop).await {
                                                return;
                                            }
                                        }
                                    }
                                    StageMode::Users { concurrency } => {
                                        while in_flight < *concurrency {
                                            if !send_or_stop(&work, &mut stop).await {
                                                return;
                                            }
                                            in_flight += 1;
                                        }
                                    }
                                }
                            }
                        }
                    }
                }

                // All stages walked; keep draining completions until told to
                // stop so workers never block on `work_done`.
                loop {
                    tokio::select! {
                        _ = stop.recv() => return,
                        maybe = done.recv() => {
                            if maybe.is_none() {
                                return;
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn send_or_stop(work: &mpsc::Sender<()>, stop: &mut mpsc::Receiver<()>) -> bool {
    tokio::select! {
        res = work.send(()) => res.is_ok(),
        _ = stop.recv() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channels(
        capacity: usize,
    ) -> (
        mpsc::Sender<()>,
        mpsc::Receiver<()>,
        mpsc::Sender<()>,
        mpsc::Receiver<()>,
        mpsc::Sender<bool>,
        mpsc::Receiver<bool>,
    ) {
        let (work_tx, work_rx) = mpsc::channel(capacity);
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (done_tx, done_rx) = mpsc::channel(capacity);
        (work_tx, work_rx, stop_tx, stop_rx, done_tx, done_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn windowed_trigger_fires_per_window_until_stopped() {
        let trigger = Trigger::constant("10/1s", Distribution::None, 0.0).unwrap();
        let (work_tx, mut work_rx, stop_tx, stop_rx, _done_tx, done_rx) = channels(64);

        let handle = tokio::spawn(trigger.source.run(work_tx, stop_rx, done_rx));

        tokio::time::sleep(Duration::from_millis(2_100)).await;

        let mut fired = 0;
        while work_rx.try_recv().is_ok() {
            fired += 1;
        }
        assert_eq!(fired, 20, "two whole windows worth of fires");

        stop_tx.send(()).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn users_stage_paces_against_completions() {
        let yaml = "scenario: s\nstages:\n  - duration: 10s\n    users: 3\n";
        let (trigger, _options) = Trigger::from_stage_file(yaml).unwrap();
        let (work_tx, mut work_rx, stop_tx, stop_rx, done_tx, done_rx) = channels(64);

        let handle = tokio::spawn(trigger.source.run(work_tx, stop_rx, done_rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut fired = 0;
        while work_rx.try_recv().is_ok() {
            fired += 1;
        }
        assert_eq!(fired, 3, "tops up to the configured concurrency");

        // One completion frees one slot.
        done_tx.send(true).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(work_rx.try_recv().is_ok());
        assert!(work_rx.try_recv().is_err());

        stop_tx.send(()).await.unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stage_walker_swaps_parameters_at_boundaries() {
        let yaml = concat!(
            "scenario: s\n",
            "stages:\n",
            "  - duration: 1s\n",
            "    rate: 1/100ms\n",
            "    parameters:\n",
            "      PHASE: warmup\n",
            "  - duration: 1s\n",
            "    rate: 1/100ms\n",
            "    parameters:\n",
            "      PHASE: steady\n",
        );
        let (trigger, _options) = Trigger::from_stage_file(yaml).unwrap();
        assert_eq!(trigger.duration, Duration::from_secs(2));

        let params = Arc::clone(&trigger.stage_params);
        let (work_tx, mut work_rx, stop_tx, stop_rx, _done_tx, done_rx) = channels(64);
        let handle = tokio::spawn(trigger.source.run(work_tx, stop_rx, done_rx));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(params.get("PHASE"), Some("warmup".to_string()));

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(params.get("PHASE"), Some("steady".to_string()));

        // Signals were flowing the whole time.
        let mut fired = 0;
        while work_rx.try_recv().is_ok() {
            fired += 1;
        }
        assert!(fired >= 10, "expected roughly one fire per 100ms, got {fired}");

        stop_tx.send(()).await.unwrap();
        handle.await.unwrap();
    }
}
