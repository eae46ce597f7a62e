use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::duration::parse_duration;
use crate::error::{Error, Result};

use super::constant::parse_rate;
use super::rate::RateFn;

/// Tick granularity for stages that pace by concurrent users rather than by
/// rate; completions are observed at this cadence even when `work_done` stalls.
const USERS_TICK: Duration = Duration::from_millis(100);

/// Parameters of the currently running stage, visible to iterations. The file
/// trigger swaps the map at each stage boundary.
#[derive(Debug, Default)]
pub struct StageParams {
    inner: RwLock<HashMap<String, String>>,
}

impl StageParams {
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.read().get(key).cloned()
    }

    pub(crate) fn replace(&self, params: HashMap<String, String>) {
        *self.inner.write() = params;
    }
}

/// How one runnable stage paces work.
#[derive(Clone)]
pub enum StageMode {
    /// Fire `rate(stage_elapsed)` signals per tick.
    Rate { rate: RateFn },
    /// Keep `concurrency` iterations in flight, topping up on completions.
    Users { concurrency: u64 },
}

#[derive(Clone)]
pub struct RunnableStage {
    pub duration: Duration,
    pub tick: Duration,
    pub mode: StageMode,
    pub parameters: HashMap<String, String>,
}

/// Run options carried by a stage file; unset fields fall back to the
/// embedder's defaults.
#[derive(Debug, Clone, Default)]
pub struct FileOptions {
    pub scenario: String,
    pub max_duration: Option<Duration>,
    pub concurrency: Option<usize>,
    pub max_iterations: Option<u64>,
    pub max_failures: Option<u64>,
    pub max_failures_rate: Option<u8>,
    pub ignore_dropped: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileConfig {
    scenario: String,
    #[serde(default)]
    max_duration: Option<String>,
    #[serde(default)]
    concurrency: Option<usize>,
    #[serde(default)]
    max_iterations: Option<u64>,
    #[serde(default)]
    max_failures: Option<u64>,
    #[serde(default)]
    max_failures_rate: Option<u8>,
    #[serde(default)]
    ignore_dropped: Option<bool>,
    stages: Vec<FileStage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FileStage {
    duration: String,
    #[serde(default)]
    rate: Option<String>,
    #[serde(default)]
    users: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_params")]
    parameters: HashMap<String, String>,
}

/// Parameter values may be written as YAML scalars; normalize them to strings.
fn deserialize_params<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = HashMap::<String, serde_yaml::Value>::deserialize(deserializer)?;
    let mut out = HashMap::with_capacity(raw.len());
    for (key, value) in raw {
        let value = match value {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Bool(b) => b.to_string(),
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::String(s) => s,
            other => {
                return Err(serde::de::Error::custom(format!(
                    "parameter `{key}` must be a scalar, got {other:?}"
                )))
            }
        };
        out.insert(key, value);
    }
    Ok(out)
}

/// Parses a YAML stage file into runnable stages plus the option overrides it
/// carries. Construction fails on the first invalid entry.
pub fn parse_stage_file(contents: &str) -> Result<(Vec<RunnableStage>, FileOptions)> {
    let config: FileConfig = serde_yaml::from_str(contents)?;

    let mut stages = Vec::with_capacity(config.stages.len());
    for (index, stage) in config.stages.iter().enumerate() {
        let duration = parse_duration(&stage.duration).map_err(|err| Error::InvalidStageFileEntry {
            index,
            reason: err.to_string(),
        })?;
        if duration.is_zero() {
            return Err(Error::InvalidStageFileEntry {
                index,
                reason: "stage duration must be positive".to_string(),
            });
        }

        let (tick, mode) = match (&stage.rate, stage.users) {
            (Some(rate_spec), None) => {
                let (count, per) = parse_rate(rate_spec).map_err(|err| Error::InvalidStageFileEntry {
                    index,
                    reason: err.to_string(),
                })?;
                let rate: RateFn = Arc::new(move |_| count);
                (per, StageMode::Rate { rate })
            }
            (None, Some(users)) => {
                if users == 0 {
                    return Err(Error::InvalidStageFileEntry {
                        index,
                        reason: "`users` must be a positive integer".to_string(),
                    });
                }
                (USERS_TICK, StageMode::Users { concurrency: users })
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidStageFileEntry {
                    index,
                    reason: "a stage may set `rate` or `users`, not both".to_string(),
                });
            }
            (None, None) => {
                return Err(Error::InvalidStageFileEntry {
                    index,
                    reason: "a stage must set `rate` or `users`".to_string(),
                });
            }
        };

        stages.push(RunnableStage {
            duration,
            tick,
            mode,
            parameters: stage.parameters.clone(),
        });
    }

    if stages.is_empty() {
        return Err(Error::EmptyStages);
    }

    let max_duration = match &config.max_duration {
        Some(raw) => Some(parse_duration(raw)?),
        None => None,
    };

    let options = FileOptions {
        scenario: config.scenario,
        max_duration,
        concurrency: config.concurrency,
        max_iterations: config.max_iterations,
        max_failures: config.max_failures,
        max_failures_rate: config.max_failures_rate,
        ignore_dropped: config.ignore_dropped,
    };

    Ok((stages, options))
}
