use std::fmt::Write as _;

use crate::registry::{SeriesSummary, ITERATION_METRIC_NAME};

const QUANTILES: [(f64, fn(&crate::registry::LatencySummary) -> f64); 4] = [
    (0.5, |l| l.p50_ms),
    (0.9, |l| l.p90_ms),
    (0.95, |l| l.p95_ms),
    (0.99, |l| l.p99_ms),
];

/// Renders the `iteration` summary in the Prometheus text exposition format.
/// Quantile values are in seconds, matching the summary convention.
pub fn render(series: &[SeriesSummary]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# TYPE {ITERATION_METRIC_NAME} summary");

    for s in series {
        let labels = format!("result=\"{}\",stage=\"{}\"", s.result, s.stage);

        if let Some(latency) = &s.latency {
            for (q, value_of) in QUANTILES {
                let _ = writeln!(
                    out,
                    "{ITERATION_METRIC_NAME}{{{labels},quantile=\"{q}\"}} {}",
                    value_of(latency) / 1_000.0
                );
            }
            let _ = writeln!(
                out,
                "{ITERATION_METRIC_NAME}_sum{{{labels}}} {}",
                latency.sum_ms / 1_000.0
            );
        } else {
            let _ = writeln!(out, "{ITERATION_METRIC_NAME}_sum{{{labels}}} 0");
        }

        let _ = writeln!(out, "{ITERATION_METRIC_NAME}_count{{{labels}}} {}", s.count);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::{ResultLabel, StageLabel};
    use crate::registry::Registry;
    use std::time::Duration;

    #[test]
    fn renders_summaries_with_stable_label_order() {
        let registry = Registry::new();
        registry.record(
            StageLabel::Iteration,
            ResultLabel::Success,
            Duration::from_millis(100),
        );
        registry.record_count(StageLabel::Iteration, ResultLabel::Dropped);

        let text = render(&registry.snapshot());

        assert!(text.starts_with("# TYPE iteration summary\n"));
        assert!(text.contains("iteration{result=\"success\",stage=\"iteration\",quantile=\"0.5\"}"));
        assert!(text.contains("iteration_count{result=\"success\",stage=\"iteration\"} 1"));
        assert!(text.contains("iteration_sum{result=\"dropped\",stage=\"iteration\"} 0"));
        assert!(text.contains("iteration_count{result=\"dropped\",stage=\"iteration\"} 1"));

        // One TYPE header only.
        assert_eq!(text.matches("# TYPE").count(), 1);
    }
}
