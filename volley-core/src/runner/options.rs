use std::time::Duration;

use crate::error::{Error, Result};
use crate::trigger::FileOptions;

pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(30);

/// Configuration of a single run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub scenario: String,
    pub max_duration: Duration,
    /// Worker count; at least 1.
    pub concurrency: usize,
    /// 0 = unbounded.
    pub max_iterations: u64,
    /// Terminate the run once this many iterations have failed. 0 = disabled.
    pub max_failures: u64,
    /// Terminate the run once this percentage of completed iterations has
    /// failed. 0 = disabled.
    pub max_failures_rate: u8,
    /// When false, any dropped iteration fails the run.
    pub ignore_dropped: bool,
    pub verbose: bool,
    /// Replay the run's log file to the console when the run fails.
    pub verbose_fail: bool,
}

impl RunOptions {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            max_duration: DEFAULT_MAX_DURATION,
            concurrency: 1,
            max_iterations: 0,
            max_failures: 0,
            max_failures_rate: 0,
            ignore_dropped: false,
            verbose: false,
            verbose_fail: false,
        }
    }

    /// Applies overrides carried by a stage file; unset fields keep their
    /// current values.
    pub fn apply_file_options(mut self, file: &FileOptions) -> Self {
        self.scenario = file.scenario.clone();
        if let Some(max_duration) = file.max_duration {
            self.max_duration = max_duration;
        }
        if let Some(concurrency) = file.concurrency {
            self.concurrency = concurrency;
        }
        if let Some(max_iterations) = file.max_iterations {
            self.max_iterations = max_iterations;
        }
        if let Some(max_failures) = file.max_failures {
            self.max_failures = max_failures;
        }
        if let Some(max_failures_rate) = file.max_failures_rate {
            self.max_failures_rate = max_failures_rate;
        }
        if let Some(ignore_dropped) = file.ignore_dropped {
            self.ignore_dropped = ignore_dropped;
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency == 0 {
            return Err(Error::InvalidConcurrency);
        }
        if self.max_duration.is_zero() {
            return Err(Error::InvalidMaxDuration);
        }
        Ok(())
    }
}
