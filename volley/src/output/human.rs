mod duration;

use std::sync::Arc;
use std::time::Duration;

use volley_core::runner::{EventFn, ProgressUpdate, RunEvent, RunSummary};
use volley_metrics::{ResultLabel, StageLabel};

use self::duration::format_duration_single;

/// Renders engine events as console lines.
pub fn events() -> EventFn {
    Arc::new(|event| match event {
        RunEvent::Started {
            scenario,
            description,
            max_duration,
            max_iterations,
        } => print_started(&scenario, &description, max_duration, max_iterations),
        RunEvent::SetupFinished { ok } => {
            if ok {
                println!("Setup completed");
            } else {
                println!("Setup failed");
            }
        }
        RunEvent::Progress(update) => print_progress(&update),
        RunEvent::MaxDurationElapsed => println!("Max duration elapsed, stopping..."),
        RunEvent::MaxIterationsReached => println!("Max iterations reached, stopping..."),
        RunEvent::FailureLimitReached => println!("Failure limit reached, stopping..."),
        RunEvent::Interrupted => println!("Interrupted, draining in-flight iterations..."),
        RunEvent::TeardownFinished { ok } => {
            if ok {
                println!("Teardown completed");
            } else {
                println!("Teardown failed");
            }
        }
    })
}

fn print_started(scenario: &str, description: &str, max_duration: Duration, max_iterations: u64) {
    println!("Running {scenario} scenario");
    println!("  trigger: {description}");
    let caps = if max_iterations > 0 {
        format!(
            "up to {} or {max_iterations} iteration(s)",
            format_duration_single(max_duration)
        )
    } else {
        format!("up to {}", format_duration_single(max_duration))
    };
    println!("  bounds: {caps}");
    println!();
}

fn print_progress(update: &ProgressUpdate) {
    let mut line = format!(
        "[{:>4}] \u{2714} {} \u{2718} {}",
        format_duration_single(update.elapsed),
        update.successful,
        update.failed,
    );
    if update.dropped > 0 {
        line.push_str(&format!(" dropped {}", update.dropped));
    }
    if let (Some(p50), Some(p95)) = (update.p50_ms, update.p95_ms) {
        line.push_str(&format!(" p50={p50:.1}ms p95={p95:.1}ms"));
    }
    println!("{line}");
}

pub fn print_summary(summary: &RunSummary) {
    println!();
    let verdict = if summary.passed { "PASSED" } else { "FAILED" };
    println!("{} {verdict}", summary.scenario);

    let elapsed_s = summary.elapsed.as_secs_f64().max(1e-9);
    println!(
        "  iterations......................: {} started, {} succeeded, {} failed, {} dropped",
        summary.iterations_started, summary.succeeded, summary.failed, summary.dropped
    );
    println!(
        "  duration........................: {} ({:.2} iterations/s)",
        format_duration_single(summary.elapsed),
        summary.succeeded as f64 / elapsed_s
    );

    for series in &summary.latency {
        if series.stage != StageLabel::Iteration || series.result != ResultLabel::Success {
            continue;
        }
        if let Some(latency) = &series.latency {
            println!(
                "  latency.........................: p50={:.1}ms p90={:.1}ms p95={:.1}ms p99={:.1}ms max={:.1}ms",
                latency.p50_ms, latency.p90_ms, latency.p95_ms, latency.p99_ms, latency.max_ms
            );
        }
    }

    for error in &summary.errors {
        println!("  error...........................: {error}");
    }

    if let Some(path) = &summary.log_file {
        println!("  logs............................: {}", path.display());
    }
}

pub fn print_scenarios(names: &[String]) {
    for name in names {
        println!("{name}");
    }
}

pub fn print_log_file_notice(path: &std::path::Path) {
    println!("Saving logs to {}\n", path.display());
}
