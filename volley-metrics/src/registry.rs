use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use hdrhistogram::Histogram;
use parking_lot::Mutex;

use crate::labels::{ResultLabel, StageLabel};

/// Name of the latency summary metric exposed to the sink.
pub const ITERATION_METRIC_NAME: &str = "iteration";

type SeriesKey = (StageLabel, ResultLabel);

#[derive(Debug)]
struct Series {
    count: AtomicU64,
    sum_us: AtomicU64,
    latency_us: Mutex<Histogram<u64>>,
}

impl Series {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum_us: AtomicU64::new(0),
            latency_us: Mutex::new(new_histogram()),
        }
    }

    fn observe(&self, elapsed: Option<Duration>) {
        self.count.fetch_add(1, Ordering::Relaxed);
        if let Some(elapsed) = elapsed {
            let us = elapsed.as_micros().min(u64::MAX as u128) as u64;
            self.sum_us.fetch_add(us, Ordering::Relaxed);
            if us > 0 {
                let _ = self.latency_us.lock().record(us);
            }
        }
    }

    fn summarize(&self, stage: StageLabel, result: ResultLabel) -> SeriesSummary {
        let count = self.count.load(Ordering::Relaxed);
        let sum_us = self.sum_us.load(Ordering::Relaxed);

        let latency = {
            let h = self.latency_us.lock();
            #[allow(clippy::len_zero)]
            if h.len() == 0 {
                None
            } else {
                Some(LatencySummary {
                    p50_ms: h.value_at_quantile(0.50) as f64 / 1_000.0,
                    p90_ms: h.value_at_quantile(0.90) as f64 / 1_000.0,
                    p95_ms: h.value_at_quantile(0.95) as f64 / 1_000.0,
                    p99_ms: h.value_at_quantile(0.99) as f64 / 1_000.0,
                    mean_ms: h.mean() / 1_000.0,
                    max_ms: h.max() as f64 / 1_000.0,
                    sum_ms: sum_us as f64 / 1_000.0,
                })
            }
        };

        SeriesSummary {
            stage,
            result,
            count,
            latency,
        }
    }
}

fn new_histogram() -> Histogram<u64> {
    // Track up to 60s in microseconds with 3 significant figures.
    Histogram::<u64>::new_with_bounds(1, 60_000_000, 3)
        .unwrap_or_else(|err| panic!("failed to init histogram: {err}"))
}

/// Latency figures in milliseconds for one (stage, result) series.
#[derive(Debug, Clone, Copy)]
pub struct LatencySummary {
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub mean_ms: f64,
    pub max_ms: f64,
    pub sum_ms: f64,
}

#[derive(Debug, Clone)]
pub struct SeriesSummary {
    pub stage: StageLabel,
    pub result: ResultLabel,
    pub count: u64,
    pub latency: Option<LatencySummary>,
}

/// Thread-safe store for the `iteration` latency summary, labelled by result
/// and stage, plus an independent window that resets at each progress tick.
#[derive(Debug, Default)]
pub struct Registry {
    cumulative: DashMap<SeriesKey, Arc<Series>>,
    progress: DashMap<SeriesKey, Arc<Series>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a timed observation into both the cumulative series and the
    /// progress window.
    pub fn record(&self, stage: StageLabel, result: ResultLabel, elapsed: Duration) {
        self.series(&self.cumulative, stage, result)
            .observe(Some(elapsed));
        self.series(&self.progress, stage, result)
            .observe(Some(elapsed));
    }

    /// Records an occurrence with no latency sample (dropped iterations).
    pub fn record_count(&self, stage: StageLabel, result: ResultLabel) {
        self.series(&self.cumulative, stage, result).observe(None);
        self.series(&self.progress, stage, result).observe(None);
    }

    fn series(
        &self,
        map: &DashMap<SeriesKey, Arc<Series>>,
        stage: StageLabel,
        result: ResultLabel,
    ) -> Arc<Series> {
        map.entry((stage, result))
            .or_insert_with(|| Arc::new(Series::new()))
            .clone()
    }

    /// Clears every series; called at run start.
    pub fn reset(&self) {
        self.cumulative.clear();
        self.progress.clear();
    }

    pub fn reset_progress(&self) {
        self.progress.clear();
    }

    /// Cumulative series, sorted by stage then result.
    pub fn snapshot(&self) -> Vec<SeriesSummary> {
        Self::summarize(&self.cumulative)
    }

    /// Progress-window series; the window resets as it is taken.
    pub fn take_progress(&self) -> Vec<SeriesSummary> {
        let out = Self::summarize(&self.progress);
        self.progress.clear();
        out
    }

    fn summarize(map: &DashMap<SeriesKey, Arc<Series>>) -> Vec<SeriesSummary> {
        let mut out: Vec<SeriesSummary> = map
            .iter()
            .map(|entry| {
                let (stage, result) = *entry.key();
                entry.value().summarize(stage, result)
            })
            .collect();
        out.sort_by_key(|s| (s.stage, s.result));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_counts_and_latency() {
        let registry = Registry::new();
        registry.record(
            StageLabel::Iteration,
            ResultLabel::Success,
            Duration::from_millis(10),
        );
        registry.record(
            StageLabel::Iteration,
            ResultLabel::Success,
            Duration::from_millis(30),
        );
        registry.record_count(StageLabel::Iteration, ResultLabel::Dropped);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 2);

        let success = snapshot
            .iter()
            .find(|s| s.result == ResultLabel::Success)
            .unwrap();
        assert_eq!(success.count, 2);
        let latency = success.latency.unwrap();
        assert!(latency.max_ms >= 29.0 && latency.max_ms <= 31.0);
        assert!((39.0..=41.0).contains(&latency.sum_ms));

        let dropped = snapshot
            .iter()
            .find(|s| s.result == ResultLabel::Dropped)
            .unwrap();
        assert_eq!(dropped.count, 1);
        assert!(dropped.latency.is_none());
    }

    #[test]
    fn progress_window_resets_when_taken() {
        let registry = Registry::new();
        registry.record(
            StageLabel::Iteration,
            ResultLabel::Success,
            Duration::from_millis(5),
        );

        let window = registry.take_progress();
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].count, 1);

        assert!(registry.take_progress().is_empty());

        // The cumulative view is unaffected.
        assert_eq!(registry.snapshot()[0].count, 1);
    }

    #[test]
    fn reset_clears_everything() {
        let registry = Registry::new();
        registry.record_count(StageLabel::Setup, ResultLabel::Success);
        registry.reset();
        assert!(registry.snapshot().is_empty());
        assert!(registry.take_progress().is_empty());
    }
}
