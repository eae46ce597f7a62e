use std::sync::Arc;
use std::time::Duration;

/// Number of iterations to fire for the scheduling window at `elapsed` time
/// since the run started.
pub type RateFn = Arc<dyn Fn(Duration) -> u64 + Send + Sync>;

/// A rate pipeline ready to drive a trigger.
#[derive(Clone)]
pub struct Rates {
    /// Length of one scheduling window; the trigger evaluates `rate` once per
    /// window.
    pub iteration_duration: Duration,
    pub rate: RateFn,
    /// Total intended run time. `Duration::ZERO` means unbounded.
    pub duration: Duration,
}

impl std::fmt::Debug for Rates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rates")
            .field("iteration_duration", &self.iteration_duration)
            .field("duration", &self.duration)
            .finish_non_exhaustive()
    }
}
