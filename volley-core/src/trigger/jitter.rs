use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::error::{Error, Result};

use super::rate::RateFn;

/// Wraps `rate` so every returned value is multiplied by a factor drawn
/// uniformly from `[1 - amount, 1 + amount]`. An amount of zero returns the
/// input unchanged; amounts outside `[0, 1)` fail.
pub fn with_jitter(rate: RateFn, amount: f64) -> Result<RateFn> {
    if amount == 0.0 {
        return Ok(rate);
    }
    if !amount.is_finite() || !(0.0..1.0).contains(&amount) {
        return Err(Error::InvalidJitter(amount));
    }

    let rng = Mutex::new(SmallRng::from_entropy());
    Ok(Arc::new(move |elapsed| {
        let factor = rng.lock().gen_range(1.0 - amount..=1.0 + amount);
        ((rate(elapsed) as f64) * factor).round().max(0.0) as u64
    }))
}
