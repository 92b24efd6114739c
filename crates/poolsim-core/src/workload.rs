//! Synthetic arrival streams.
//!
//! Two generators live here:
//!
//! - [`generate_surge`]: a long "surge" trace whose class mix drifts over
//!   time. A mix profile alternates stable stretches with short transitions
//!   that move weight between class 1 and class 3, bouncing between `cap`
//!   and 1 (class 2 stays fixed). Inside each stretch arrivals are Poisson
//!   with total rate `(r1 + r2 + r3) / rate_div` and class drawn by weight.
//! - [`poisson_stream`]: a short homogeneous stream from per-class rates,
//!   used as the synthetic future of the estimated control mode.
//!
//! ```text
//!   r1 ▲ cap ────┐        ┌──────
//!      │         └──┐  ┌──┘
//!      │ 1          └──┘          (r3 mirrors r1)
//!      └──────────────────────► t
//! ```

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::arrival::{Arrival, CLASS_COUNT, JobClass};
use crate::error::ConfigError;
use crate::rate_estimator::Rates;
use crate::stepper::{pick_weighted, sample_exponential};

/// Mean length of a stable stretch of the mix profile.
const STABLE_MEAN_SEC: f64 = 200.0;
/// Mean length of a transition stretch.
const TRANSITION_MEAN_SEC: f64 = 60.0;

/// Parameters of the surge generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeConfig {
    /// Length of the generated trace in seconds
    pub duration_sec: f64,
    /// Highest weight class 1 or class 3 can reach
    pub cap: u32,
    /// Constant class-2 weight
    pub r2: u32,
    /// Divisor from summed weights to arrivals per second
    pub rate_div: f64,
    /// Seed of the arrival draws
    pub seed: u64,
    /// Seed of the mix profile
    pub profile_seed: u64,
}

impl Default for SurgeConfig {
    fn default() -> Self {
        Self {
            duration_sec: 300.0,
            cap: 8,
            r2: 1,
            rate_div: 10.0,
            seed: 12345,
            profile_seed: 42,
        }
    }
}

impl SurgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.duration_sec.is_finite() && self.duration_sec > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "duration_sec",
                value: self.duration_sec,
            });
        }
        if !(self.rate_div.is_finite() && self.rate_div > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "rate_div",
                value: self.rate_div,
            });
        }
        if self.cap == 0 {
            return Err(ConfigError::NotPositive {
                field: "cap",
                value: 0.0,
            });
        }
        Ok(())
    }
}

/// One breakpoint of the mix profile; holds until the next point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixPoint {
    /// Start of the stretch in seconds
    pub start: f64,
    pub weights: [u32; CLASS_COUNT],
}

impl MixPoint {
    #[must_use]
    pub fn weight_sum(&self) -> u32 {
        self.weights.iter().sum()
    }
}

/// Build the piecewise-constant mix profile over `[0, duration]`.
///
/// The last point always sits exactly at `duration`.
pub fn surge_profile<R: Rng + ?Sized>(config: &SurgeConfig, rng: &mut R) -> Vec<MixPoint> {
    let end = config.duration_sec;
    let cap = config.cap.max(1);
    let mut points = Vec::new();
    let mut t = 0.0;
    let (mut r1, mut r3) = (cap, 1_u32);
    let mut toward_class3 = true;

    while t < end {
        let stable = rng.random::<f64>() < 0.5;
        let mean = if stable {
            STABLE_MEAN_SEC
        } else {
            TRANSITION_MEAN_SEC
        };
        let duration = sample_exponential(1.0 / mean, rng).min(end - t);

        if !stable {
            let delta = if rng.random::<bool>() { 1 } else { 2 };
            if toward_class3 {
                let moved = delta.min(r1.saturating_sub(1));
                r1 -= moved;
                r3 += moved;
                if r3 >= cap {
                    toward_class3 = false;
                }
            } else {
                let moved = delta.min(r3.saturating_sub(1));
                r3 -= moved;
                r1 += moved;
                if r1 >= cap {
                    toward_class3 = true;
                }
            }
        }

        points.push(MixPoint {
            start: t,
            weights: [r1, config.r2, r3],
        });
        t += duration;
    }

    let closing = points
        .last()
        .map_or([cap, config.r2, 1], |p| p.weights);
    if points.last().is_none_or(|p| p.start < end) {
        points.push(MixPoint {
            start: end,
            weights: closing,
        });
    }
    points
}

/// Generate a surge trace, sorted by time, with every arrival in `(0, duration]`.
pub fn generate_surge(config: &SurgeConfig) -> Result<Vec<Arrival>, ConfigError> {
    config.validate()?;
    let mut profile_rng = Xoshiro256PlusPlus::seed_from_u64(config.profile_seed);
    let profile = surge_profile(config, &mut profile_rng);
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.seed);

    let end = config.duration_sec;
    let mut arrivals = Vec::new();
    let mut t = 0.0;
    let mut segment = 0;

    while t < end {
        while segment + 1 < profile.len() && profile[segment + 1].start <= t {
            segment += 1;
        }
        let point = profile[segment];
        let segment_end = profile.get(segment + 1).map_or(end, |p| p.start);

        let lambda = f64::from(point.weight_sum()) / config.rate_div;
        if lambda <= 0.0 {
            t = segment_end;
            continue;
        }

        while t < segment_end {
            t += sample_exponential(lambda, &mut rng);
            // Overshoot is dropped; the clock keeps the overshoot time.
            if t > segment_end || t > end {
                break;
            }
            let weights = point.weights.map(f64::from);
            if let Some(class) = pick_weighted(&weights, &mut rng).and_then(class_at) {
                arrivals.push(Arrival::new(t, class));
            }
        }
    }

    tracing::debug!(
        arrivals = arrivals.len(),
        segments = profile.len(),
        duration = end,
        "generated surge workload"
    );
    Ok(arrivals)
}

/// Homogeneous Poisson arrivals on `[start, start + horizon)` from per-class rates.
pub fn poisson_stream<R: Rng + ?Sized>(
    rates: &Rates,
    start: f64,
    horizon: f64,
    rng: &mut R,
) -> Vec<Arrival> {
    let total = rates.total();
    if !(total.is_finite() && total > 0.0) || horizon <= 0.0 {
        return Vec::new();
    }
    let end = start + horizon;
    let weights = rates.as_array();
    let mut arrivals = Vec::new();
    let mut t = start;
    loop {
        t += sample_exponential(total, rng);
        if t >= end {
            break;
        }
        if let Some(class) = pick_weighted(&weights, rng).and_then(class_at) {
            arrivals.push(Arrival::new(t, class));
        }
    }
    arrivals
}

fn class_at(index: usize) -> Option<JobClass> {
    JobClass::ALL.get(index).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrival::validate_stream;

    #[test]
    fn default_surge_is_sorted_and_bounded() {
        let arrivals = generate_surge(&SurgeConfig::default()).unwrap();
        assert!(!arrivals.is_empty());
        validate_stream(&arrivals).unwrap();
        assert!(arrivals.iter().all(|a| a.time > 0.0 && a.time <= 300.0));
    }

    #[test]
    fn surge_is_reproducible_per_seed() {
        let config = SurgeConfig::default();
        assert_eq!(generate_surge(&config).unwrap(), generate_surge(&config).unwrap());
        let other = SurgeConfig {
            seed: 1,
            ..SurgeConfig::default()
        };
        assert_ne!(generate_surge(&config).unwrap(), generate_surge(&other).unwrap());
    }

    #[test]
    fn profile_stays_within_cap_and_closes_at_end() {
        let config = SurgeConfig {
            duration_sec: 5_000.0,
            ..SurgeConfig::default()
        };
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(config.profile_seed);
        let profile = surge_profile(&config, &mut rng);
        assert_eq!(profile[0].start, 0.0);
        assert_eq!(profile.last().unwrap().start, 5_000.0);
        for point in &profile {
            let [r1, r2, r3] = point.weights;
            assert!((1..=config.cap).contains(&r1));
            assert!((1..=config.cap).contains(&r3));
            assert_eq!(r2, 1);
            // Weight only moves between classes 1 and 3.
            assert_eq!(r1 + r3, config.cap + 1);
        }
        assert!(profile.windows(2).all(|w| w[0].start <= w[1].start));
    }

    #[test]
    fn rejects_bad_parameters() {
        let bad = SurgeConfig {
            rate_div: 0.0,
            ..SurgeConfig::default()
        };
        assert!(generate_surge(&bad).is_err());
        let bad = SurgeConfig {
            cap: 0,
            ..SurgeConfig::default()
        };
        assert!(generate_surge(&bad).is_err());
    }

    #[test]
    fn poisson_stream_respects_window_and_zero_rates() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(5);
        let stream = poisson_stream(&Rates::new(2.0, 0.0, 1.0), 10.0, 5.0, &mut rng);
        assert!(stream.iter().all(|a| a.time >= 10.0 && a.time < 15.0));
        assert!(stream.iter().all(|a| a.class != JobClass::Two));
        validate_stream(&stream).unwrap();
        assert!(poisson_stream(&Rates::default(), 0.0, 5.0, &mut rng).is_empty());
    }

    #[test]
    fn poisson_stream_mean_count_is_plausible() {
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(17);
        let n = poisson_stream(&Rates::new(1.0, 1.0, 1.0), 0.0, 1_000.0, &mut rng).len();
        // Expected 3000, sd ~55.
        assert!((2_700..=3_300).contains(&n), "{n}");
    }
}
