use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use volley_core::parse_duration as parse_core_duration;
use volley_core::trigger::Distribution;

fn parse_duration(input: &str) -> Result<Duration, String> {
    parse_core_duration(input).map_err(|err| err.to_string())
}

fn parse_distribution(input: &str) -> Result<Distribution, String> {
    input.parse().map_err(|err: volley_core::Error| err.to_string())
}

#[derive(Debug, Parser)]
#[command(
    name = "volley",
    author,
    version,
    about = "Rate-driven load generation for registered scenarios",
    long_about = "volley drives registered scenarios at a configurable rate for a bounded \
duration, collecting latency and success/failure metrics.\n\nA scenario is a named unit of work \
with Setup, Iteration and Teardown hooks, registered by the embedding binary."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a scenario with a chosen trigger
    Run(RunCommand),

    /// List registered scenarios
    Scenarios,
}

#[derive(Debug, Args)]
pub struct RunCommand {
    #[command(subcommand)]
    pub trigger: TriggerCommand,
}

#[derive(Debug, Subcommand)]
pub enum TriggerCommand {
    /// Trigger iterations at a constant rate
    Constant {
        #[command(flatten)]
        common: CommonArgs,

        /// Iterations to start per interval, e.g. `10/1s`
        #[arg(short, long, default_value = "1/1s")]
        rate: String,

        /// Name of the scenario to run
        scenario: String,
    },

    /// Trigger iterations at rates varying over a staged ramp
    Staged {
        #[command(flatten)]
        common: CommonArgs,

        /// Comma-separated `<stage_duration>:<target>` pairs; within each
        /// stage the rate ramps linearly to the target
        #[arg(short, long, default_value = "10s:1")]
        stages: String,

        /// How frequently the staged rate is evaluated
        #[arg(short = 'f', long, default_value = "1s", value_parser = parse_duration)]
        iteration_frequency: Duration,

        /// Name of the scenario to run
        scenario: String,
    },

    /// Trigger iterations according to a YAML stage file
    File {
        /// Path to the stage file; run options come from the file
        path: PathBuf,
    },
}

#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Number of concurrent workers executing iterations
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Longest time the run may take
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub max_duration: Duration,

    /// Stop the run after this many iterations (0 = unbounded)
    #[arg(long, default_value_t = 0)]
    pub max_iterations: u64,

    /// Stop the run after this many failed iterations (0 = disabled)
    #[arg(long, default_value_t = 0)]
    pub max_failures: u64,

    /// Stop the run once this percentage of iterations has failed (0 = disabled)
    #[arg(long, default_value_t = 0)]
    pub max_failures_rate: u8,

    /// Do not fail the run when iterations are dropped
    #[arg(long)]
    pub ignore_dropped: bool,

    /// How fires are spread within each scheduling window
    #[arg(long, default_value = "regular", value_parser = parse_distribution)]
    pub distribution: Distribution,

    /// Randomly perturb each rate value by up to ±<jitter> (fraction in [0, 1))
    #[arg(long, default_value_t = 0.0)]
    pub jitter: f64,

    /// Log to the console instead of the per-run log file
    #[arg(long)]
    pub verbose: bool,

    /// Replay the per-run log file to the console when the run fails
    #[arg(long)]
    pub verbose_fail: bool,
}
