//! Embedding API for the volley load-generation engine.
//!
//! Register scenarios and hand control to [`Volley::execute`], which parses
//! the command line, drives the selected trigger and returns a process exit
//! code:
//!
//! ```no_run
//! use std::sync::Arc;
//! use volley::{Scenario, SetupOutput, Volley};
//!
//! #[tokio::main]
//! async fn main() {
//!     let code = Volley::new()
//!         .scenario(Scenario::new(
//!             "hello",
//!             Arc::new(|_state| {
//!                 Box::pin(async {
//!                     SetupOutput::new(Arc::new(|_iteration| Box::pin(async {})))
//!                 })
//!             }),
//!         ))
//!         .execute()
//!         .await;
//!     std::process::exit(code);
//! }
//! ```

mod cli;
mod envsettings;
mod exit_codes;
mod logging;
mod output;
mod run;

use clap::Parser as _;

pub use exit_codes::ExitCode;
pub use volley_core::runner::{
    IterationFn, IterationState, ProgressUpdate, RunEvent, RunSummary, Scenario, ScenarioState,
    Scenarios, SetupFn, SetupOutput, TeardownFn,
};
pub use volley_core::{Error, Result};

/// The embedding entry point: a scenario registry plus the CLI front end.
#[derive(Default)]
pub struct Volley {
    scenarios: Scenarios,
}

impl Volley {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.register(scenario);
        self
    }

    /// Parses `std::env::args` and runs the selected command. Returns the
    /// process exit code; non-zero when the run failed.
    pub async fn execute(self) -> i32 {
        self.execute_with_args(std::env::args()).await
    }

    pub async fn execute_with_args<I, T>(self, args: I) -> i32
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = match cli::Cli::try_parse_from(args) {
            Ok(cli) => cli,
            Err(err) => {
                use clap::error::ErrorKind;
                let _ = err.print();
                return match err.kind() {
                    ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                        ExitCode::Success.as_i32()
                    }
                    _ => ExitCode::InvalidInput.as_i32(),
                };
            }
        };

        match cli.command {
            cli::Command::Run(command) => match run::run(&self.scenarios, command).await {
                Ok(code) => code.as_i32(),
                Err(err) => {
                    eprintln!("{err:#}");
                    classify_error(&err).as_i32()
                }
            },
            cli::Command::Scenarios => {
                output::human::print_scenarios(&self.scenarios.names());
                ExitCode::Success.as_i32()
            }
        }
    }
}

fn classify_error(err: &anyhow::Error) -> ExitCode {
    if err.downcast_ref::<volley_core::Error>().is_some() {
        return ExitCode::InvalidInput;
    }
    if let Some(io) = err.downcast_ref::<std::io::Error>() {
        if io.kind() == std::io::ErrorKind::NotFound {
            return ExitCode::InvalidInput;
        }
    }
    ExitCode::RuntimeError
}
