mod events;
mod options;
mod queue;
mod rated;
mod result;
mod run;
mod scenario;
mod shutdown;
mod timer;

pub use events::{noop_events, EventFn, ProgressUpdate, RunEvent};
pub use options::{RunOptions, DEFAULT_MAX_DURATION};
pub use queue::WorkQueue;
pub use rated::{RateCallback, RatedRunner, Schedule};
pub use result::{RunResult, RunSummary};
pub use run::{Run, NEXT_ITERATION_WINDOW};
pub use scenario::{
    ActiveScenario, IterationFn, IterationState, Scenario, ScenarioState, Scenarios, SetupFn,
    SetupOutput, TeardownFn,
};
pub use shutdown::ShutdownSignal;
pub use timer::{CancellableTimer, TimerHandle};
