use std::sync::Arc;
use std::time::Duration;

use crate::duration::parse_duration;
use crate::error::{Error, Result};

use super::distribution::{distribute, Distribution};
use super::jitter::with_jitter;
use super::rate::{RateFn, Rates};

/// Parses a rate literal `<count>/<duration>`, e.g. `10/1s`. A bare count is
/// per second.
pub fn parse_rate(spec: &str) -> Result<(u64, Duration)> {
    let (count, per) = match spec.split_once('/') {
        Some((count, per)) => (count.trim(), parse_duration(per.trim())?),
        None => (spec.trim(), Duration::from_secs(1)),
    };

    let count: u64 = count
        .parse()
        .map_err(|_| Error::InvalidRate(spec.to_string()))?;
    if per.is_zero() {
        return Err(Error::InvalidRate(spec.to_string()));
    }

    Ok((count, per))
}

/// Builds a constant rate pipeline firing `count` times per window, with the
/// run length left unbounded.
pub fn constant_rates(rate_spec: &str, distribution: Distribution, jitter: f64) -> Result<Rates> {
    let (count, frequency) = parse_rate(rate_spec)?;

    let rate: RateFn = Arc::new(move |_| count);
    let rate = with_jitter(rate, jitter)?;
    let (iteration_duration, rate) = distribute(distribution, frequency, rate);

    Ok(Rates {
        iteration_duration,
        rate,
        duration: Duration::ZERO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rate_literals() {
        assert_eq!(parse_rate("10/1s").unwrap(), (10, Duration::from_secs(1)));
        assert_eq!(parse_rate("5/100ms").unwrap(), (5, Duration::from_millis(100)));
        assert_eq!(parse_rate("3").unwrap(), (3, Duration::from_secs(1)));
    }

    #[test]
    fn rejects_malformed_rates() {
        assert!(parse_rate("").is_err());
        assert!(parse_rate("x/1s").is_err());
        assert!(parse_rate("10/abc").is_err());
        assert!(parse_rate("10/0s").is_err());
        assert!(parse_rate("-1/1s").is_err());
    }

    #[test]
    fn regular_distribution_spreads_the_window() {
        let rates = constant_rates("10/1s", Distribution::Regular, 0.0).unwrap();
        assert_eq!(rates.iteration_duration, Duration::from_millis(100));
        assert_eq!((rates.rate)(Duration::ZERO), 1);
        assert_eq!(rates.duration, Duration::ZERO);
    }
}
