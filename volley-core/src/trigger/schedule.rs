use std::time::Duration;

use crate::error::{Error, Result};

/// One ramp segment: over `duration`, the rate moves linearly from the
/// previous stage's target (initially 0) to `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stage {
    pub duration: Duration,
    pub target: u64,
}

/// Piecewise-linear rate schedule over a stage list.
#[derive(Debug, Clone)]
pub struct StageSchedule {
    stages: Vec<Stage>,
    cumulative_ends: Vec<Duration>,
}

impl StageSchedule {
    pub fn new(stages: Vec<Stage>) -> Result<Self> {
        if stages.is_empty() {
            return Err(Error::EmptyStages);
        }

        let mut cumulative_ends = Vec::with_capacity(stages.len());
        let mut acc = Duration::ZERO;
        for s in &stages {
            acc = acc.saturating_add(s.duration);
            cumulative_ends.push(acc);
        }

        Ok(Self {
            stages,
            cumulative_ends,
        })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.cumulative_ends
            .last()
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Rate at `elapsed` since the start of the schedule. Zero once every
    /// stage has finished. Values at interior stage boundaries equal the
    /// boundary stage's declared target.
    pub fn target_at(&self, elapsed: Duration) -> u64 {
        let total = self.total_duration();
        if elapsed >= total {
            return 0;
        }

        let idx = match self
            .cumulative_ends
            .binary_search_by(|end| end.cmp(&elapsed))
        {
            Ok(i) => i,
            Err(i) => i,
        };

        let stage_end = self.cumulative_ends[idx];
        let stage_start = if idx == 0 {
            Duration::ZERO
        } else {
            self.cumulative_ends[idx - 1]
        };

        let stage = &self.stages[idx];
        let stage_duration = stage_end.saturating_sub(stage_start);
        let stage_elapsed = elapsed.saturating_sub(stage_start);

        let start_target = if idx == 0 { 0 } else { self.stages[idx - 1].target };
        let end_target = stage.target;

        if stage_duration.is_zero() {
            return end_target;
        }

        let fraction = stage_elapsed.as_nanos() as f64 / stage_duration.as_nanos() as f64;
        let cur = start_target as f64 + (end_target as f64 - start_target as f64) * fraction;
        cur.round().max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(stages: &[(u64, u64)]) -> StageSchedule {
        StageSchedule::new(
            stages
                .iter()
                .map(|&(secs, target)| Stage {
                    duration: Duration::from_secs(secs),
                    target,
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn empty_stage_lists_fail() {
        assert!(StageSchedule::new(Vec::new()).is_err());
    }

    #[test]
    fn interpolates_linearly_within_a_stage() {
        let s = schedule(&[(10, 0), (10, 10)]);
        assert_eq!(s.total_duration(), Duration::from_secs(20));

        assert_eq!(s.target_at(Duration::ZERO), 0);
        assert_eq!(s.target_at(Duration::from_secs(5)), 0);
        assert_eq!(s.target_at(Duration::from_secs(15)), 5);
        assert_eq!(s.target_at(Duration::from_millis(17_500)), 8);
    }

    #[test]
    fn boundary_values_equal_declared_targets() {
        let s = schedule(&[(10, 4), (10, 10)]);
        assert_eq!(s.target_at(Duration::from_secs(10)), 4);
        assert_eq!(s.target_at(Duration::from_secs(19)), 9);
    }

    #[test]
    fn rate_is_zero_after_the_last_stage() {
        let s = schedule(&[(10, 4)]);
        assert_eq!(s.target_at(Duration::from_secs(10)), 0);
        assert_eq!(s.target_at(Duration::from_secs(60)), 0);
    }

    #[test]
    fn ramps_down_as_well_as_up() {
        let s = schedule(&[(10, 10), (10, 0)]);
        assert_eq!(s.target_at(Duration::from_secs(15)), 5);
        assert_eq!(s.target_at(Duration::from_secs(18)), 2);
    }
}
