use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{Error, Result};

use super::rate::RateFn;

/// Smallest scheduling window the regular distribution will produce. Anything
/// finer would outrun the engine's millisecond-granularity timers.
const MIN_WINDOW: Duration = Duration::from_millis(1);

/// How fires are spread within one base scheduling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Distribution {
    /// Deliver the whole window's count in one burst at the window boundary.
    None,
    /// Split the window into sub-windows and deliver fires evenly across them.
    Regular,
}

impl std::fmt::Display for Distribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Regular => f.write_str("regular"),
        }
    }
}

impl FromStr for Distribution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "none" => Ok(Self::None),
            "regular" => Ok(Self::Regular),
            other => Err(Error::InvalidDistribution(other.to_string())),
        }
    }
}

/// Shapes `rate` (which produces counts for windows of length `frequency`)
/// into a possibly finer `(window, rate)` pair.
pub fn distribute(kind: Distribution, frequency: Duration, rate: RateFn) -> (Duration, RateFn) {
    match kind {
        Distribution::None => (frequency, rate),
        Distribution::Regular => regular(frequency, rate),
    }
}

/// The sub-window is sized from the rate at the start of the run. The rate may
/// change over the run, so fractional fire counts are carried between
/// sub-windows; each base window still delivers the underlying rate's count
/// within ±1.
fn regular(frequency: Duration, rate: RateFn) -> (Duration, RateFn) {
    let initial = rate(Duration::ZERO).max(1).min(u32::MAX as u64) as u32;
    let window = (frequency / initial).max(MIN_WINDOW);

    let scale = window.as_secs_f64() / frequency.as_secs_f64();
    let carry = Mutex::new(0.0f64);
    let distributed: RateFn = Arc::new(move |elapsed| {
        let mut carry = carry.lock();
        *carry += rate(elapsed) as f64 * scale;
        let due = carry.floor();
        *carry -= due;
        due as u64
    });

    (window, distributed)
}
