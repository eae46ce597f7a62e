pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid duration `{0}` (expected e.g. 10s, 250ms, 1m)")]
    InvalidDuration(String),

    #[error("invalid rate `{0}` (expected `<count>/<duration>`, e.g. `10/1s`)")]
    InvalidRate(String),

    #[error("invalid stage `{0}` (expected `<duration>:<target>`, e.g. `10s:5`)")]
    InvalidStage(String),

    #[error("stage `{0}` must have a positive duration")]
    InvalidStageDuration(String),

    #[error("`stages` must contain at least one `<duration>:<target>` entry")]
    EmptyStages,

    #[error("invalid distribution `{0}` (expected `none` or `regular`)")]
    InvalidDistribution(String),

    #[error("invalid jitter `{0}` (expected a fraction in [0, 1))")]
    InvalidJitter(f64),

    #[error("`concurrency` must be a positive integer")]
    InvalidConcurrency,

    #[error("`max-duration` must be a positive duration")]
    InvalidMaxDuration,

    #[error("stage file entry {index}: {reason}")]
    InvalidStageFileEntry { index: usize, reason: String },

    #[error("parsing stage file: {0}")]
    StageFileFormat(#[from] serde_yaml::Error),

    #[error("schedule must contain at least one entry")]
    EmptySchedule,

    #[error("scenario not defined: {0}")]
    UnknownScenario(String),
}
