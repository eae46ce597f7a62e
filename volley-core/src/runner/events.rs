use std::sync::Arc;
use std::time::Duration;

/// Window counters and latency figures carried by one progress tick.
#[derive(Debug, Clone, Default)]
pub struct ProgressUpdate {
    pub elapsed: Duration,
    /// Length of the progress window being reported.
    pub period: Duration,
    pub successful: u64,
    pub failed: u64,
    pub dropped: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub max_ms: Option<f64>,
}

/// Lifecycle notifications the engine emits instead of printing; the embedder
/// decides how to render them.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Started {
        scenario: String,
        description: String,
        max_duration: Duration,
        max_iterations: u64,
    },
    SetupFinished {
        ok: bool,
    },
    Progress(ProgressUpdate),
    MaxDurationElapsed,
    MaxIterationsReached,
    /// The failure-count or failure-rate gate tripped.
    FailureLimitReached,
    Interrupted,
    TeardownFinished {
        ok: bool,
    },
}

pub type EventFn = Arc<dyn Fn(RunEvent) + Send + Sync>;

/// Discards every event; useful for embedders that only consume the summary.
pub fn noop_events() -> EventFn {
    Arc::new(|_| {})
}
