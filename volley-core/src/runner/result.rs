use std::path::PathBuf;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use volley_metrics::{ResultLabel, SeriesSummary, StageLabel};

/// Thread-safe accumulator for the outcome of one run.
#[derive(Debug, Default)]
pub struct RunResult {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    started: Option<Instant>,
    finished: Option<Instant>,
    errors: Vec<String>,
    log_file: Option<PathBuf>,
    iteration_metrics: Vec<SeriesSummary>,
}

impl RunResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; the first call pins the run's start time.
    pub fn record_started(&self) {
        let mut inner = self.inner.lock();
        if inner.started.is_none() {
            inner.started = Some(Instant::now());
        }
    }

    pub fn record_finished(&self) {
        let mut inner = self.inner.lock();
        if inner.finished.is_none() {
            inner.finished = Some(Instant::now());
        }
    }

    pub fn elapsed(&self) -> Duration {
        let inner = self.inner.lock();
        match (inner.started, inner.finished) {
            (Some(started), Some(finished)) => finished.duration_since(started),
            (Some(started), None) => started.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn add_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!("{message}");
        self.inner.lock().errors.push(message);
    }

    pub fn set_log_file(&self, path: PathBuf) {
        self.inner.lock().log_file = Some(path);
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.inner.lock().log_file.clone()
    }

    /// Installs the final iteration-stage metric series gathered from the
    /// registry.
    pub fn set_iteration_metrics(&self, series: Vec<SeriesSummary>) {
        self.inner.lock().iteration_metrics = series;
    }

    fn result_count(&self, result: ResultLabel) -> u64 {
        self.inner
            .lock()
            .iteration_metrics
            .iter()
            .filter(|s| s.stage == StageLabel::Iteration && s.result == result)
            .map(|s| s.count)
            .sum()
    }

    pub fn failed(&self, ignore_dropped: bool) -> bool {
        if !self.inner.lock().errors.is_empty() {
            return true;
        }
        if self.result_count(ResultLabel::Fail) > 0 {
            return true;
        }
        !ignore_dropped && self.result_count(ResultLabel::Dropped) > 0
    }

    pub fn summary(
        &self,
        scenario: &str,
        iterations_started: u64,
        ignore_dropped: bool,
    ) -> RunSummary {
        let passed = !self.failed(ignore_dropped);
        let inner = self.inner.lock();

        let count = |result: ResultLabel| -> u64 {
            inner
                .iteration_metrics
                .iter()
                .filter(|s| s.stage == StageLabel::Iteration && s.result == result)
                .map(|s| s.count)
                .sum()
        };

        let elapsed = match (inner.started, inner.finished) {
            (Some(started), Some(finished)) => finished.duration_since(started),
            (Some(started), None) => started.elapsed(),
            _ => Duration::ZERO,
        };

        RunSummary {
            scenario: scenario.to_string(),
            passed,
            iterations_started,
            succeeded: count(ResultLabel::Success),
            failed: count(ResultLabel::Fail),
            dropped: count(ResultLabel::Dropped),
            elapsed,
            latency: inner.iteration_metrics.clone(),
            errors: inner.errors.clone(),
            log_file: inner.log_file.clone(),
        }
    }
}

/// Snapshot of a finished run, ready for rendering.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub scenario: String,
    pub passed: bool,
    pub iterations_started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub dropped: u64,
    pub elapsed: Duration,
    /// Iteration-stage metric series, one per result label that occurred.
    pub latency: Vec<SeriesSummary>,
    pub errors: Vec<String>,
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(result: ResultLabel, count: u64) -> SeriesSummary {
        SeriesSummary {
            stage: StageLabel::Iteration,
            result,
            count,
            latency: None,
        }
    }

    #[test]
    fn failure_reflects_errors_failures_and_drop_policy() {
        let result = RunResult::new();
        assert!(!result.failed(false));

        result.set_iteration_metrics(vec![series(ResultLabel::Success, 10)]);
        assert!(!result.failed(false));

        result.set_iteration_metrics(vec![
            series(ResultLabel::Success, 10),
            series(ResultLabel::Dropped, 1),
        ]);
        assert!(result.failed(false));
        assert!(!result.failed(true));

        result.set_iteration_metrics(vec![series(ResultLabel::Fail, 1)]);
        assert!(result.failed(true));

        let errored = RunResult::new();
        errored.add_error("teardown failed");
        assert!(errored.failed(true));
    }

    #[test]
    fn summary_totals_come_from_the_gathered_series()  {
        let result = RunResult::new();
        result.record_started();
        result.set_iteration_metrics(vec![
            series(ResultLabel::Success, 8),
            series(ResultLabel::Fail, 2),
            series(ResultLabel::Dropped, 3),
        ]);
        result.record_finished();

        let summary = result.summary("s", 13, true);
        assert_eq!(summary.succeeded, 8);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.dropped, 3);
        assert_eq!(summary.iterations_started, 13);
        assert!(summary.passed);
    }
}
