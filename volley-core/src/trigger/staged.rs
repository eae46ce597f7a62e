use std::sync::Arc;
use std::time::Duration;

use crate::duration::parse_duration;
use crate::error::{Error, Result};

use super::distribution::{distribute, Distribution};
use super::jitter::with_jitter;
use super::rate::{RateFn, Rates};
use super::schedule::{Stage, StageSchedule};

/// Parses a comma-separated list of `<stage_duration>:<target>` entries.
/// Nothing is accepted from a list containing a malformed entry.
pub fn parse_stages(spec: &str) -> Result<Vec<Stage>> {
    let mut stages = Vec::new();
    for entry in spec.split(',') {
        let entry = entry.trim();
        let (dur, target) = entry
            .split_once(':')
            .ok_or_else(|| Error::InvalidStage(entry.to_string()))?;

        let duration = parse_duration(dur.trim())?;
        if duration.is_zero() {
            return Err(Error::InvalidStageDuration(entry.to_string()));
        }

        let target: u64 = target
            .trim()
            .parse()
            .map_err(|_| Error::InvalidStage(entry.to_string()))?;

        stages.push(Stage { duration, target });
    }

    if stages.is_empty() {
        return Err(Error::EmptyStages);
    }
    Ok(stages)
}

/// Builds the staged rate pipeline: stage schedule, then jitter, then
/// distribution over `frequency` windows. The resulting duration is the sum of
/// the stage durations.
pub fn staged_rates(
    stages_spec: &str,
    frequency: Duration,
    distribution: Distribution,
    jitter: f64,
) -> Result<Rates> {
    let schedule = StageSchedule::new(parse_stages(stages_spec)?)?;
    let duration = schedule.total_duration();

    let schedule = Arc::new(schedule);
    let rate: RateFn = Arc::new(move |elapsed| schedule.target_at(elapsed));
    let rate = with_jitter(rate, jitter)?;
    let (iteration_duration, rate) = distribute(distribution, frequency, rate);

    Ok(Rates {
        iteration_duration,
        rate,
        duration,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_stage_list() {
        let stages = parse_stages("10s:0, 30s:10,1m:5").unwrap();
        assert_eq!(
            stages,
            vec![
                Stage {
                    duration: Duration::from_secs(10),
                    target: 0,
                },
                Stage {
                    duration: Duration::from_secs(30),
                    target: 10,
                },
                Stage {
                    duration: Duration::from_secs(60),
                    target: 5,
                },
            ]
        );
    }

    #[test]
    fn rejects_malformed_entries_without_partial_acceptance() {
        assert!(parse_stages("").is_err());
        assert!(parse_stages("10s").is_err());
        assert!(parse_stages("10s:abc").is_err());
        assert!(parse_stages("10s:-1").is_err());
        assert!(parse_stages("abc:1").is_err());
        assert!(parse_stages("10s:1,oops").is_err());
        assert!(parse_stages("0s:1").is_err());
    }

    #[test]
    fn staged_rates_report_the_total_duration() {
        let rates = staged_rates(
            "10s:0,10s:10",
            Duration::from_secs(1),
            Distribution::None,
            0.0,
        )
        .unwrap();

        assert_eq!(rates.duration, Duration::from_secs(20));
        assert_eq!(rates.iteration_duration, Duration::from_secs(1));
        assert_eq!((rates.rate)(Duration::from_secs(15)), 5);
    }
}
