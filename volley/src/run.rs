use std::sync::Arc;

use anyhow::Context as _;

use volley_core::runner::{Run, RunOptions, RunSummary, Scenarios, ShutdownSignal};
use volley_core::trigger::Trigger;
use volley_metrics::{Pusher, Registry};

use crate::cli::{CommonArgs, RunCommand, TriggerCommand};
use crate::envsettings::Settings;
use crate::exit_codes::ExitCode;
use crate::logging;
use crate::output::human;

pub async fn run(scenarios: &Scenarios, command: RunCommand) -> anyhow::Result<ExitCode> {
    let settings = Settings::from_env();

    let (trigger, options) = build_trigger(command)?;
    let verbose_fail = options.verbose_fail;

    let redirect = logging::init(
        &options.scenario,
        settings.log_file_path.as_deref(),
        options.verbose,
    )?;
    if let Some(path) = &redirect.path {
        human::print_log_file_notice(path);
    }

    let metrics = Arc::new(Registry::new());
    let pusher = match &settings.push_gateway {
        Some(gateway) => Some(Arc::new(
            Pusher::new(
                gateway,
                &format!("volley-{}", options.scenario),
                settings.namespace.as_deref(),
                settings.label_id.as_deref(),
            )
            .context("configuring metrics push gateway")?,
        )),
        None => None,
    };

    let run = Run::new(options, trigger, human::events(), metrics, pusher)?;
    if let Some(path) = &redirect.path {
        run.result().set_log_file(path.clone());
    }

    let shutdown = Arc::new(ShutdownSignal::new());
    let signals = spawn_signal_handler(Arc::clone(&shutdown));

    let summary = run.execute(shutdown, scenarios).await?;

    signals.abort();
    drop(redirect);

    human::print_summary(&summary);
    replay_log_on_failure(&summary, verbose_fail);

    if summary.passed {
        Ok(ExitCode::Success)
    } else {
        Ok(ExitCode::RunFailed)
    }
}

fn build_trigger(command: RunCommand) -> anyhow::Result<(Trigger, RunOptions)> {
    match command.trigger {
        TriggerCommand::Constant {
            common,
            rate,
            scenario,
        } => {
            let trigger = Trigger::constant(&rate, common.distribution, common.jitter)
                .context("building constant trigger")?;
            Ok((trigger, apply_common(RunOptions::new(scenario), &common)))
        }
        TriggerCommand::Staged {
            common,
            stages,
            iteration_frequency,
            scenario,
        } => {
            let trigger = Trigger::staged(
                &stages,
                iteration_frequency,
                common.distribution,
                common.jitter,
            )
            .context("building staged trigger")?;
            Ok((trigger, apply_common(RunOptions::new(scenario), &common)))
        }
        TriggerCommand::File { path } => {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("reading stage file {}", path.display()))?;
            let (trigger, file_options) =
                Trigger::from_stage_file(&contents).context("parsing stage file")?;
            let options = RunOptions::new("").apply_file_options(&file_options);
            Ok((trigger, options))
        }
    }
}

fn apply_common(mut options: RunOptions, common: &CommonArgs) -> RunOptions {
    options.concurrency = common.concurrency;
    options.max_duration = common.max_duration;
    options.max_iterations = common.max_iterations;
    options.max_failures = common.max_failures;
    options.max_failures_rate = common.max_failures_rate;
    options.ignore_dropped = common.ignore_dropped;
    options.verbose = common.verbose;
    options.verbose_fail = common.verbose_fail;
    options
}

fn replay_log_on_failure(summary: &RunSummary, verbose_fail: bool) {
    if !verbose_fail || summary.passed {
        return;
    }
    let Some(path) = &summary.log_file else {
        return;
    };
    if let Err(err) = logging::replay(path) {
        tracing::error!("replaying log file: {err:#}");
    }
}

/// First signal requests a graceful drain; a second one terminates the
/// process immediately.
fn spawn_signal_handler(shutdown: Arc<ShutdownSignal>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::error!("installing SIGTERM handler: {err}");
                    return;
                }
            };

        loop {
            #[cfg(unix)]
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
            #[cfg(not(unix))]
            {
                let _ = tokio::signal::ctrl_c().await;
            }

            if shutdown.is_shutdown() {
                std::process::exit(130);
            }
            shutdown.shutdown();
        }
    })
}
