//! Continuous-time phase dynamics and arrival injection.
//!
//! Between arrivals the model is a jump process: every occupied phase `j`
//! completes at rate `j * occupancy[j] / bph`, and the four completion clocks
//! race as independent exponentials.
//!
//! ```text
//!   R  = r1 + r2 + r3 + r4
//!   τ  = -ln(u) / R                   time to the next completion
//!   j  ~ Categorical(r1/R .. r4/R)    which phase completes
//! ```
//!
//! While the clock runs, the stepper integrates the idle pool over time.
//! The pool only changes on a phase-4 completion, so each sub-interval is
//! charged with the pool value at its start.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::arrival::JobClass;
use crate::error::{ConfigError, InvariantViolation};
use crate::state::{EntryWeights, PHASE_COUNT, Phase, SystemState};

/// Uniform draws are kept inside `[MIN_UNIFORM, 1 - MIN_UNIFORM]`.
pub const MIN_UNIFORM: f64 = 1e-12;

/// Draw an exponential waiting time with the given total rate.
pub fn sample_exponential<R: Rng + ?Sized>(rate: f64, rng: &mut R) -> f64 {
    let u = (1.0 - rng.random::<f64>()).clamp(MIN_UNIFORM, 1.0 - MIN_UNIFORM);
    -u.ln() / rate
}

/// Cumulative-weight draw: the first index whose running sum exceeds
/// `u' ~ U(0, total)`.
///
/// Returns `None` when no weight is positive.
pub fn pick_weighted<R: Rng + ?Sized>(weights: &[f64], rng: &mut R) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let target = rng.random::<f64>() * total;
    let mut acc = 0.0;
    for (i, w) in weights.iter().enumerate() {
        acc += w;
        if target < acc {
            return Some(i);
        }
    }
    // Rounding left `target` at the very top; take the last live slot.
    weights.iter().rposition(|w| *w > 0.0)
}

/// Outcome of advancing over one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StepDelta {
    /// Integral of the idle pool over the interval (unit-seconds).
    pub idle_area: f64,
    /// Interval length in seconds.
    pub elapsed: f64,
    /// Phase completions that fired.
    pub transitions: u64,
}

impl StepDelta {
    /// Fold another delta into this one.
    pub fn absorb(&mut self, other: StepDelta) {
        self.idle_area += other.idle_area;
        self.elapsed += other.elapsed;
        self.transitions += other.transitions;
    }
}

/// Samples the competing-exponential phase dynamics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StochasticStepper {
    bph: f64,
}

impl StochasticStepper {
    /// Build a stepper with service-rate divisor `bph` (must be positive).
    pub fn new(bph: f64) -> Result<Self, ConfigError> {
        if !(bph.is_finite() && bph > 0.0) {
            return Err(ConfigError::NotPositive {
                field: "bph",
                value: bph,
            });
        }
        Ok(Self { bph })
    }

    #[must_use]
    pub fn bph(&self) -> f64 {
        self.bph
    }

    /// Per-phase completion rates for the given occupancy.
    #[must_use]
    pub fn completion_rates(&self, state: &SystemState) -> [f64; PHASE_COUNT] {
        Phase::ALL.map(|phase| {
            let n = state.occupancy(phase);
            if n == 0 {
                0.0
            } else {
                f64::from(phase.number()) * f64::from(n) / self.bph
            }
        })
    }

    /// Realize `[t0, t1]` on `state`, returning the idle-area integral.
    pub fn advance<R: Rng + ?Sized>(
        &self,
        state: &mut SystemState,
        t0: f64,
        t1: f64,
        rng: &mut R,
    ) -> Result<StepDelta, InvariantViolation> {
        if t1 <= t0 {
            return Ok(StepDelta::default());
        }

        let mut t = t0;
        let mut delta = StepDelta {
            elapsed: t1 - t0,
            ..StepDelta::default()
        };

        loop {
            let rates = self.completion_rates(state);
            let total: f64 = rates.iter().sum();
            let pool = f64::from(state.pool());

            if total <= 0.0 {
                delta.idle_area += pool * (t1 - t);
                break;
            }

            let tau = sample_exponential(total, rng);
            if t + tau >= t1 {
                delta.idle_area += pool * (t1 - t);
                break;
            }

            delta.idle_area += pool * tau;
            t += tau;

            let Some(index) = pick_weighted(&rates, rng) else {
                break;
            };
            let Some(phase) = Phase::from_index(index) else {
                break;
            };
            state.complete(phase)?;
            delta.transitions += 1;
            tracing::trace!(
                time = t,
                from = %phase,
                to = %phase.next().map_or_else(|| "Pool".to_string(), |p| p.to_string()),
                "phase completion"
            );
        }

        Ok(delta)
    }
}

/// Result of offering one arrival to the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "phase")]
pub enum Admission {
    Admitted(Phase),
    Rejected,
}

impl Admission {
    #[must_use]
    pub fn is_rejected(self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// Offer an arrival of `class` to `state`.
///
/// An empty pool rejects without touching the state. Otherwise the entry
/// phase is drawn from the class weights and one unit leaves the pool. A
/// class whose weights sum to zero has no route and is rejected as well;
/// validated configs never contain one.
pub fn inject_arrival<R: Rng + ?Sized>(
    state: &mut SystemState,
    class: JobClass,
    weights: &EntryWeights,
    rng: &mut R,
) -> Result<Admission, InvariantViolation> {
    if state.pool() == 0 {
        return Ok(Admission::Rejected);
    }
    let Some(phase) = pick_weighted(weights.for_class(class), rng).and_then(Phase::from_index)
    else {
        return Ok(Admission::Rejected);
    };
    state.admit(phase)?;
    Ok(Admission::Admitted(phase))
}
