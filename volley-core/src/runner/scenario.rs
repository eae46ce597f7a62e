use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use volley_metrics::{Registry, ResultLabel, StageLabel};

use crate::trigger::StageParams;

pub type SetupFn = Arc<dyn Fn(Arc<ScenarioState>) -> BoxFuture<'static, SetupOutput> + Send + Sync>;
pub type IterationFn = Arc<dyn Fn(Arc<IterationState>) -> BoxFuture<'static, ()> + Send + Sync>;
pub type TeardownFn = Arc<dyn Fn(Arc<ScenarioState>) -> BoxFuture<'static, ()> + Send + Sync>;

/// What a scenario's setup hook hands back: the iteration body and an optional
/// teardown hook.
pub struct SetupOutput {
    pub iterate: IterationFn,
    pub teardown: Option<TeardownFn>,
}

impl SetupOutput {
    pub fn new(iterate: IterationFn) -> Self {
        Self {
            iterate,
            teardown: None,
        }
    }

    #[must_use]
    pub fn with_teardown(mut self, teardown: TeardownFn) -> Self {
        self.teardown = Some(teardown);
        self
    }
}

/// A named unit of user-defined work. Setup runs once per run and returns the
/// iteration body; teardown runs unconditionally afterwards.
pub struct Scenario {
    name: String,
    setup: SetupFn,
}

impl Scenario {
    pub fn new(name: impl Into<String>, setup: SetupFn) -> Self {
        Self {
            name: name.into(),
            setup,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Registered scenarios, looked up by name at run start.
#[derive(Default)]
pub struct Scenarios {
    by_name: HashMap<String, Scenario>,
}

impl Scenarios {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations replace earlier ones with the same name.
    pub fn register(&mut self, scenario: Scenario) {
        self.by_name.insert(scenario.name.clone(), scenario);
    }

    pub fn get(&self, name: &str) -> Option<&Scenario> {
        self.by_name.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.by_name.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Run-scoped pass/fail state shared with the scenario's hooks. Any hook may
/// mark it failed.
#[derive(Debug)]
pub struct ScenarioState {
    name: Arc<str>,
    failed: AtomicBool,
}

impl ScenarioState {
    fn new(name: &str) -> Self {
        Self {
            name: Arc::from(name),
            failed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fail(&self, reason: &str) {
        tracing::error!(scenario = %self.name, "scenario failed: {reason}");
        self.failed.store(true, Ordering::Release);
    }

    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

/// Per-worker scratch state, reset between iterations.
#[derive(Debug)]
pub struct IterationState {
    scenario: Arc<str>,
    id: Mutex<String>,
    failed: AtomicBool,
    params: Arc<StageParams>,
}

impl IterationState {
    pub(crate) fn new(scenario: &str, params: Arc<StageParams>) -> Self {
        Self {
            scenario: Arc::from(scenario),
            id: Mutex::new(String::new()),
            failed: AtomicBool::new(false),
            params,
        }
    }

    pub(crate) fn reset(&self, id: String) {
        *self.id.lock() = id;
        self.failed.store(false, Ordering::Release);
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn id(&self) -> String {
        self.id.lock().clone()
    }

    /// Parameter of the active stage (file-driven runs), if any.
    pub fn param(&self, key: &str) -> Option<String> {
        self.params.get(key)
    }

    pub fn fail(&self, reason: &str) {
        tracing::warn!(scenario = %self.scenario, iteration = %self.id(), "iteration failed: {reason}");
        self.failed.store(true, Ordering::Release);
    }

    pub fn failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }
}

struct Hooks {
    iterate: IterationFn,
    teardown: Option<TeardownFn>,
}

/// A scenario whose setup hook has run. Iterations and teardown are spawned as
/// tasks so a panicking hook is contained and recorded as a failure instead of
/// taking a worker down.
pub struct ActiveScenario {
    state: Arc<ScenarioState>,
    hooks: Option<Hooks>,
    metrics: Arc<Registry>,
}

impl ActiveScenario {
    pub async fn new(scenario: &Scenario, metrics: Arc<Registry>) -> Self {
        let state = Arc::new(ScenarioState::new(scenario.name()));

        let started = std::time::Instant::now();
        let setup = (scenario.setup)(Arc::clone(&state));
        let hooks = match tokio::spawn(setup).await {
            Ok(output) => Some(Hooks {
                iterate: output.iterate,
                teardown: output.teardown,
            }),
            Err(err) => {
                state.fail(&format!("setup panicked: {err}"));
                None
            }
        };
        let elapsed = started.elapsed();

        let result = if state.failed() {
            ResultLabel::Fail
        } else {
            ResultLabel::Success
        };
        metrics.record(StageLabel::Setup, result, elapsed);

        Self {
            state,
            hooks,
            metrics,
        }
    }

    /// Whether setup marked the run failed (or panicked).
    pub fn setup_failed(&self) -> bool {
        self.state.failed()
    }

    pub fn state(&self) -> &Arc<ScenarioState> {
        &self.state
    }

    /// Runs one iteration, recording its latency and outcome. Returns whether
    /// the iteration passed.
    pub async fn run(&self, state: Arc<IterationState>) -> bool {
        let Some(hooks) = &self.hooks else {
            return false;
        };

        let started = std::time::Instant::now();
        let joined = tokio::spawn((hooks.iterate)(Arc::clone(&state))).await;
        let elapsed = started.elapsed();

        let ok = match joined {
            Ok(()) => !state.failed(),
            Err(err) => {
                tracing::error!(
                    scenario = %state.scenario(),
                    iteration = %state.id(),
                    "iteration panicked: {err}"
                );
                false
            }
        };

        let result = if ok {
            ResultLabel::Success
        } else {
            ResultLabel::Fail
        };
        self.metrics.record(StageLabel::Iteration, result, elapsed);

        ok
    }

    /// A fire suppressed because all workers were busy.
    pub fn record_dropped(&self) {
        self.metrics
            .record_count(StageLabel::Iteration, ResultLabel::Dropped);
    }

    /// Runs the teardown hook if setup registered one. Returns whether
    /// teardown passed; failures never suppress summary emission.
    pub async fn teardown(&self) -> bool {
        let teardown = match &self.hooks {
            Some(hooks) => hooks.teardown.clone(),
            None => None,
        };
        let Some(teardown) = teardown else {
            return true;
        };

        let failed_before = self.state.failed();
        let started = std::time::Instant::now();
        let joined = tokio::spawn(teardown(Arc::clone(&self.state))).await;
        let elapsed = started.elapsed();

        let ok = match joined {
            Ok(()) => failed_before || !self.state.failed(),
            Err(err) => {
                self.state.fail(&format!("teardown panicked: {err}"));
                false
            }
        };

        let result = if ok {
            ResultLabel::Success
        } else {
            ResultLabel::Fail
        };
        self.metrics.record(StageLabel::Teardown, result, elapsed);

        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    fn noop_scenario(name: &str) -> Scenario {
        Scenario::new(
            name,
            Arc::new(|_state| {
                Box::pin(async {
                    SetupOutput::new(Arc::new(|_s| Box::pin(async {})))
                })
            }),
        )
    }

    #[test]
    fn registry_lists_names_sorted_and_replaces_duplicates() {
        let mut scenarios = Scenarios::new();
        scenarios.register(noop_scenario("b"));
        scenarios.register(noop_scenario("a"));
        scenarios.register(noop_scenario("b"));

        assert_eq!(scenarios.names(), vec!["a".to_string(), "b".to_string()]);
        assert!(scenarios.get("a").is_some());
        assert!(scenarios.get("missing").is_none());
    }

    #[tokio::test]
    async fn iteration_failure_is_scoped_to_one_iteration() {
        let metrics = Arc::new(Registry::new());
        let scenario = Scenario::new(
            "flaky",
            Arc::new(|_state| {
                Box::pin(async {
                    SetupOutput::new(Arc::new(|s: Arc<IterationState>| {
                        Box::pin(async move {
                            if s.id() == "1" {
                                s.fail("first iteration always fails");
                            }
                        })
                    }))
                })
            }),
        );

        let active = ActiveScenario::new(&scenario, metrics).await;
        assert!(!active.setup_failed());

        let state = Arc::new(IterationState::new("flaky", Arc::default()));
        state.reset("1".to_string());
        assert!(!active.run(Arc::clone(&state)).await);

        state.reset("2".to_string());
        assert!(active.run(state).await);
    }

    #[tokio::test]
    async fn panics_in_hooks_are_contained() {
        let metrics = Arc::new(Registry::new());
        let scenario = Scenario::new(
            "explosive",
            Arc::new(|_state| {
                Box::pin(async {
                    SetupOutput::new(Arc::new(|_s| {
                        Box::pin(async { panic!("iteration blew up") })
                    }))
                })
            }),
        );

        let active = ActiveScenario::new(&scenario, metrics).await;
        let state = Arc::new(IterationState::new("explosive", Arc::default()));
        state.reset("1".to_string());
        assert!(!active.run(state).await);
        assert!(active.teardown().await);
    }

    #[tokio::test]
    async fn teardown_runs_the_registered_hook_once() {
        let metrics = Arc::new(Registry::new());
        let calls = Arc::new(AtomicU64::new(0));
        let calls_in_teardown = Arc::clone(&calls);

        let scenario = Scenario::new(
            "counted",
            Arc::new(move |_state| {
                let calls = Arc::clone(&calls_in_teardown);
                Box::pin(async move {
                    SetupOutput::new(Arc::new(|_s| Box::pin(async {}))).with_teardown(Arc::new(
                        move |_state| {
                            calls.fetch_add(1, Ordering::Relaxed);
                            Box::pin(async {})
                        },
                    ))
                })
            }),
        );

        let active = ActiveScenario::new(&scenario, metrics).await;
        assert!(active.teardown().await);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
