use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use volley_metrics::{Pusher, Registry, ResultLabel, StageLabel};

use crate::error::{Error, Result};
use crate::trigger::Trigger;

use super::events::{EventFn, ProgressUpdate, RunEvent};
use super::options::RunOptions;
use super::queue::WorkQueue;
use super::rated::{RateCallback, RatedRunner, Schedule};
use super::result::{RunResult, RunSummary};
use super::scenario::{ActiveScenario, IterationState, Scenarios};
use super::shutdown::ShutdownSignal;
use super::timer::{CancellableTimer, TimerHandle};

/// Dispatch stops this long before the duration budget so an iteration is
/// never started that cannot finish inside it.
pub const NEXT_ITERATION_WINDOW: Duration = Duration::from_millis(10);

const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Progress cadence: every second for the first minute, then backing off over
/// the lifetime of long runs.
fn progress_schedule() -> Vec<Schedule> {
    vec![
        Schedule {
            start_delay: Duration::from_nanos(1),
            frequency: Duration::from_secs(1),
        },
        Schedule {
            start_delay: Duration::from_secs(60),
            frequency: Duration::from_secs(10),
        },
        Schedule {
            start_delay: Duration::from_secs(300),
            frequency: Duration::from_secs(30),
        },
        Schedule {
            start_delay: Duration::from_secs(600),
            frequency: Duration::from_secs(60),
        },
    ]
}

/// Counters shared between the dispatcher and the worker pool.
#[derive(Debug, Default)]
struct Shared {
    /// Iteration numbers allocated by the dispatcher.
    allocated: AtomicU64,
    /// Iteration numbers actually handed to workers.
    dispatched: AtomicU64,
    failures: AtomicU64,
    completed: AtomicU64,
    busy_workers: AtomicUsize,
    drop_notified: AtomicBool,
    gate_notified: AtomicBool,
    max_iterations_notified: AtomicBool,
    /// Set once shutdown has begun; allocations after this point are recorded
    /// as dropped rather than dispatched.
    stopping: AtomicBool,
}

/// One run of one scenario: worker pool, trigger, duration budget, drain and
/// teardown.
pub struct Run {
    options: RunOptions,
    trigger: Trigger,
    events: EventFn,
    metrics: Arc<Registry>,
    pusher: Option<Arc<Pusher>>,
    result: Arc<RunResult>,
    shared: Arc<Shared>,
}

impl Run {
    pub fn new(
        options: RunOptions,
        trigger: Trigger,
        events: EventFn,
        metrics: Arc<Registry>,
        pusher: Option<Arc<Pusher>>,
    ) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options,
            trigger,
            events,
            metrics,
            pusher,
            result: Arc::new(RunResult::new()),
            shared: Arc::new(Shared::default()),
        })
    }

    /// The accumulating result; embedders may attach the log-file path here
    /// before executing.
    pub fn result(&self) -> Arc<RunResult> {
        Arc::clone(&self.result)
    }

    /// Drives the run to completion. Teardown runs on every path that got as
    /// far as setup, including cancellation; `shutdown` only stops dispatch.
    pub async fn execute(
        self,
        shutdown: Arc<ShutdownSignal>,
        scenarios: &Scenarios,
    ) -> Result<RunSummary> {
        let Run {
            options,
            trigger,
            events,
            metrics,
            pusher,
            result,
            shared,
        } = self;

        (events)(RunEvent::Started {
            scenario: options.scenario.clone(),
            description: trigger.description.clone(),
            max_duration: options.max_duration,
            max_iterations: options.max_iterations,
        });

        metrics.reset();

        let progress_runner = Arc::new(RatedRunner::new(
            progress_callback(Arc::clone(&metrics), Arc::clone(&result), Arc::clone(&events)),
            progress_schedule(),
        )?);

        let scenario = scenarios
            .get(&options.scenario)
            .ok_or_else(|| Error::UnknownScenario(options.scenario.clone()))?;

        // From here on teardown must run on every exit path; nothing below
        // returns early.
        let active = Arc::new(ActiveScenario::new(scenario, Arc::clone(&metrics)).await);
        push_metrics(&pusher, &metrics).await;

        if active.setup_failed() {
            result.add_error("setup failed");
            (events)(RunEvent::SetupFinished { ok: false });
        } else {
            (events)(RunEvent::SetupFinished { ok: true });
            result.record_started();
            progress_runner.run();

            let (ticker_stop_tx, ticker_stop_rx) = tokio::sync::oneshot::channel::<()>();
            let ticker = tokio::spawn({
                let pusher = pusher.clone();
                let metrics = Arc::clone(&metrics);
                async move {
                    let mut stop = ticker_stop_rx;
                    let mut interval = tokio::time::interval(METRICS_REFRESH_INTERVAL);
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    interval.tick().await;
                    loop {
                        tokio::select! {
                            _ = interval.tick() => push_metrics(&pusher, &metrics).await,
                            _ = &mut stop => return,
                        }
                    }
                }
            });

            run_loop(
                &options,
                trigger,
                &events,
                &shared,
                &active,
                &result,
                &shutdown,
                &progress_runner,
            )
            .await;

            progress_runner.terminate().await;
            let _ = ticker_stop_tx.send(());
            let _ = ticker.await;
        }

        let teardown_ok = active.teardown().await;
        if !teardown_ok {
            result.add_error("teardown failed");
        }
        (events)(RunEvent::TeardownFinished { ok: teardown_ok });
        push_metrics(&pusher, &metrics).await;

        result.record_finished();
        result.set_iteration_metrics(metrics.snapshot());

        Ok(result.summary(
            &options.scenario,
            shared.dispatched.load(Ordering::Relaxed),
            options.ignore_dropped,
        ))
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_loop(
    options: &RunOptions,
    trigger: Trigger,
    events: &EventFn,
    shared: &Arc<Shared>,
    active: &Arc<ActiveScenario>,
    result: &Arc<RunResult>,
    shutdown: &ShutdownSignal,
    progress_runner: &RatedRunner,
) {
    let Trigger {
        source,
        duration: trigger_duration,
        stage_params,
        ..
    } = trigger;

    let workers = options.concurrency;
    let queue = Arc::new(WorkQueue::new());

    let (work_done_tx, work_done_rx) = mpsc::channel::<bool>(workers);
    let (work_triggered_tx, mut work_triggered_rx) = mpsc::channel::<()>(workers);
    let (stop_trigger_tx, stop_trigger_rx) = mpsc::channel::<()>(1);

    let mut worker_handles = Vec::with_capacity(workers);
    for _ in 0..workers {
        let state = Arc::new(IterationState::new(
            &options.scenario,
            Arc::clone(&stage_params),
        ));
        worker_handles.push(tokio::spawn(worker_loop(
            Arc::clone(shared),
            Arc::clone(active),
            Arc::clone(&queue),
            work_done_tx.clone(),
            state,
        )));
    }
    drop(work_done_tx);

    // A bounded trigger restricts the run below the configured maximum.
    let mut duration = options.max_duration;
    if !trigger_duration.is_zero() && trigger_duration < duration {
        duration = trigger_duration;
    }

    let (timer, timer_handle) =
        CancellableTimer::new(duration.saturating_sub(NEXT_ITERATION_WINDOW));
    result.record_started();

    let trigger_handle = tokio::spawn(source.run(work_triggered_tx, stop_trigger_rx, work_done_rx));

    let stopper = tokio::spawn({
        let queue = Arc::clone(&queue);
        let shared = Arc::clone(shared);
        let events = Arc::clone(events);
        async move {
            let elapsed = timer.wait().await;
            shared.stopping.store(true, Ordering::Release);
            if elapsed {
                (events)(RunEvent::MaxDurationElapsed);
            }
            tracing::info!("stopping workers");
            let _ = stop_trigger_tx.send(()).await;
            queue.close();
        }
    });

    let mut interrupted = false;
    let mut trigger_done = false;
    loop {
        tokio::select! {
            _ = shutdown.wait(), if !interrupted => {
                interrupted = true;
                (events)(RunEvent::Interrupted);
                // Make the next progress line land immediately on the resumed
                // cadence.
                progress_runner.reset();
                timer_handle.cancel();
            }
            maybe = work_triggered_rx.recv(), if !trigger_done => {
                match maybe {
                    Some(()) => dispatch(options, shared, active, &queue, &timer_handle, events),
                    None => trigger_done = true,
                }
            }
            _ = queue.wait_closed() => break,
        }
    }

    for handle in worker_handles {
        let _ = handle.await;
    }
    let _ = trigger_handle.await;
    let _ = stopper.await;

    // Numbers authorized but never claimed died with the pool; account for
    // them so totals reconcile.
    for _ in 0..queue.unclaimed() {
        active.record_dropped();
    }

    result.record_finished();
}

fn dispatch(
    options: &RunOptions,
    shared: &Shared,
    active: &ActiveScenario,
    queue: &WorkQueue,
    timer_handle: &TimerHandle,
    events: &EventFn,
) {
    let outstanding = shared.busy_workers.load(Ordering::Acquire) as u64
        + queue.unclaimed();
    if outstanding >= options.concurrency as u64 {
        active.record_dropped();
        if !shared.drop_notified.swap(true, Ordering::Relaxed) {
            tracing::warn!(
                "dropping iterations because every worker is busy; consider increasing --concurrency"
            );
        }
        return;
    }

    if failure_gate_crossed(options, shared) {
        if !shared.gate_notified.swap(true, Ordering::Relaxed) {
            (events)(RunEvent::FailureLimitReached);
            timer_handle.cancel();
        }
        return;
    }

    let iteration = shared.allocated.fetch_add(1, Ordering::Relaxed) + 1;
    if options.max_iterations > 0 && iteration > options.max_iterations {
        if !shared.max_iterations_notified.swap(true, Ordering::Relaxed) {
            (events)(RunEvent::MaxIterationsReached);
            timer_handle.cancel();
        }
        return;
    }

    if shared.stopping.load(Ordering::Acquire) {
        // Allocated but no longer dispatchable.
        active.record_dropped();
        return;
    }

    shared.dispatched.fetch_add(1, Ordering::Relaxed);
    queue.push(iteration);
}

fn failure_gate_crossed(options: &RunOptions, shared: &Shared) -> bool {
    let failures = shared.failures.load(Ordering::Relaxed);
    if options.max_failures > 0 && failures >= options.max_failures {
        return true;
    }

    if options.max_failures_rate > 0 {
        // Only armed after enough completions to make a percentage meaningful.
        let completed = shared.completed.load(Ordering::Relaxed);
        if completed >= 100 {
            return failures.saturating_mul(100) / completed >= options.max_failures_rate as u64;
        }
    }

    false
}

async fn worker_loop(
    shared: Arc<Shared>,
    active: Arc<ActiveScenario>,
    queue: Arc<WorkQueue>,
    work_done: mpsc::Sender<bool>,
    state: Arc<IterationState>,
) {
    loop {
        let Some(iteration) = queue.claim().await else {
            return;
        };

        shared.busy_workers.fetch_add(1, Ordering::AcqRel);
        state.reset(iteration.to_string());
        let ok = active.run(Arc::clone(&state)).await;
        if !ok {
            shared.failures.fetch_add(1, Ordering::Relaxed);
        }
        shared.completed.fetch_add(1, Ordering::Relaxed);
        shared.busy_workers.fetch_sub(1, Ordering::AcqRel);

        // Nobody may be listening during shutdown; racing the close keeps the
        // worker from blocking forever.
        tokio::select! {
            res = work_done.send(true) => {
                if res.is_err() {
                    return;
                }
            }
            _ = queue.wait_closed() => return,
        }
    }
}

fn progress_callback(
    metrics: Arc<Registry>,
    result: Arc<RunResult>,
    events: EventFn,
) -> RateCallback {
    Arc::new(move |period, _now| {
        let window = metrics.take_progress();

        let mut update = ProgressUpdate {
            elapsed: result.elapsed(),
            period,
            ..Default::default()
        };
        for series in &window {
            if series.stage != StageLabel::Iteration {
                continue;
            }
            match series.result {
                ResultLabel::Success => {
                    update.successful += series.count;
                    if let Some(latency) = &series.latency {
                        update.p50_ms = Some(latency.p50_ms);
                        update.p95_ms = Some(latency.p95_ms);
                        update.max_ms = Some(latency.max_ms);
                    }
                }
                ResultLabel::Fail => update.failed += series.count,
                ResultLabel::Dropped => update.dropped += series.count,
                ResultLabel::Unknown => {}
            }
        }

        (events)(RunEvent::Progress(update));
    })
}

async fn push_metrics(pusher: &Option<Arc<Pusher>>, metrics: &Registry) {
    if let Some(pusher) = pusher {
        if let Err(err) = pusher.push(metrics).await {
            tracing::error!("unable to push metrics to gateway: {err}");
        }
    }
}
