//! Metrics for the volley engine: a thread-safe registry for the `iteration`
//! latency summary (labelled by result and stage), a progress window that
//! resets at each tick, Prometheus text exposition and a push-gateway client.

pub mod exposition;
mod labels;
mod push;
mod registry;

pub use labels::{ResultLabel, StageLabel};
pub use push::{PushError, PushResult, Pusher};
pub use registry::{LatencySummary, Registry, SeriesSummary, ITERATION_METRIC_NAME};
