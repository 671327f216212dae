use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// A normal sample with mean `(min + max) / 2` and standard deviation
/// `(max - min) / 4`, resampled until it lands in `[min, max]`.
///
/// `min >= max` collapses to `min`.
pub fn truncated_normal<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if !(max > min) {
        return min;
    }
    let mean = (min + max) / 2.0;
    let sd = (max - min) / 4.0;
    let Ok(normal) = Normal::new(mean, sd) else {
        return mean;
    };
    loop {
        let value = normal.sample(rng);
        if (min..=max).contains(&value) {
            return value;
        }
    }
}

/// How long the scheduler sleeps between two ticks
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntervalPolicy {
    Fixed { secs: f64 },
    /// See [`truncated_normal`]
    Randomized { min_secs: f64, max_secs: f64 },
}

impl Default for IntervalPolicy {
    fn default() -> Self {
        Self::Fixed { secs: 3600.0 }
    }
}

impl IntervalPolicy {
    pub fn fixed(secs: f64) -> Self {
        Self::Fixed { secs }
    }

    pub fn randomized(min_secs: f64, max_secs: f64) -> Self {
        Self::Randomized { min_secs, max_secs }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match *self {
            Self::Fixed { secs } => {
                if !(secs.is_finite() && secs >= 0.0) {
                    anyhow::bail!("interval must be a non-negative number of seconds, got {secs}");
                }
            }
            Self::Randomized { min_secs, max_secs } => {
                if !(min_secs.is_finite() && max_secs.is_finite() && min_secs >= 0.0) {
                    anyhow::bail!("invalid interval bounds [{min_secs}, {max_secs}]");
                }
                if min_secs > max_secs {
                    anyhow::bail!("interval min {min_secs}s is larger than max {max_secs}s");
                }
            }
        }
        Ok(())
    }

    pub fn next_delay(&self) -> Duration {
        self.next_delay_with(&mut rand::rng())
    }

    pub fn next_delay_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let secs = match *self {
            Self::Fixed { secs } => secs,
            Self::Randomized { min_secs, max_secs } => truncated_normal(rng, min_secs, max_secs),
        };
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
    }
}
