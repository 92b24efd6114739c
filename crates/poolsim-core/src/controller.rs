//! Predictive admission controller.
//!
//! At every control epoch the controller picks the total capacity
//! `T = pool + busy` for the coming period. It clones the live state, sets
//! the pool to `T - busy`, replays the arrivals of the next `horizon_sec`
//! through the stochastic model and counts rejections. Candidates are
//! scanned upward and the first one whose projected rejection rate meets
//! the SLO wins.
//!
//! # Search
//!
//! ```text
//!   lower = max(busy, pool_min)
//!   upper = max(lower, busy + pool_max)
//!
//!   for T in lower..=upper:
//!       rate(T) = rejections(T) / n
//!       rate(T) <= slo  → MetSlo(T)
//!   none                → Fallback(upper), rate 1.0
//! ```
//!
//! An empty horizon short-circuits to `max(pool_min, busy)` with
//! `NoFutureArrivals`.
//!
//! # Trial randomness
//!
//! Under [`TrialRngPolicy::Shared`] every trial draws from the live stream,
//! so the outcome of candidate `T` depends on how many candidates were tried
//! before it. [`TrialRngPolicy::Independent`] seeds each trial from
//! `(seed, epoch, T)`; trials are then order-free and may run on scoped
//! threads.

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::arrival::{Arrival, slice_window};
use crate::config::{ControlMode, ControllerConfig, TrialRngPolicy};
use crate::error::InvariantViolation;
use crate::rate_estimator::Rates;
use crate::state::{EntryWeights, SystemState};
use crate::stepper::{StochasticStepper, inject_arrival};
use crate::workload::poisson_stream;

/// Projected rejection rate reported when no candidate meets the SLO.
pub const FALLBACK_REJECTION_RATE: f64 = 1.0;

/// How a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOutcome {
    /// A candidate met the SLO.
    MetSlo,
    /// No candidate met the SLO; the upper bound was chosen.
    Fallback,
    /// Nothing arrives inside the horizon.
    NoFutureArrivals,
    /// Lookahead is switched off.
    Disabled,
}

impl std::fmt::Display for PredictionOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MetSlo => "met_slo",
            Self::Fallback => "fallback",
            Self::NoFutureArrivals => "no_future_arrivals",
            Self::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Projected rejection rate at the chosen target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub rejection_rate: f64,
    /// Arrivals replayed by the winning trial
    pub sample_count: usize,
    pub outcome: PredictionOutcome,
}

/// Capacity decision for one control epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub target_total: u32,
    pub prediction: Prediction,
}

/// Rejections seen by one forward trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrialOutcome {
    pub candidate: u32,
    pub arrivals: usize,
    pub rejections: usize,
}

impl TrialOutcome {
    #[must_use]
    pub fn rejection_rate(&self) -> f64 {
        if self.arrivals == 0 {
            0.0
        } else {
            self.rejections as f64 / self.arrivals as f64
        }
    }
}

/// SplitMix64 finalizer.
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seed of the trial for `candidate` at `epoch` under the independent policy.
#[must_use]
pub fn trial_seed(seed: u64, epoch: u64, candidate: u32) -> u64 {
    splitmix64(splitmix64(splitmix64(seed) ^ epoch) ^ u64::from(candidate))
}

/// Chooses the capacity target at each control epoch.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    config: ControllerConfig,
    stepper: StochasticStepper,
    weights: EntryWeights,
    seed: u64,
    last_prediction: Option<Prediction>,
}

impl AdmissionController {
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        stepper: StochasticStepper,
        weights: EntryWeights,
        seed: u64,
    ) -> Self {
        Self {
            config,
            stepper,
            weights,
            seed,
            last_prediction: None,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Prediction behind the most recent decision.
    #[must_use]
    pub fn last_prediction(&self) -> Option<&Prediction> {
        self.last_prediction.as_ref()
    }

    /// Decide according to the configured [`ControlMode`].
    ///
    /// `arrivals` is the full sorted stream (used by the predictive mode),
    /// `rates` the current estimate (used by the estimated mode).
    pub fn decide<R: Rng + ?Sized>(
        &mut self,
        state: &SystemState,
        now: f64,
        arrivals: &[Arrival],
        rates: &Rates,
        epoch_index: u64,
        rng: &mut R,
    ) -> Result<Decision, InvariantViolation> {
        match self.config.mode {
            ControlMode::Predictive => {
                self.choose_target(state, now, arrivals, epoch_index, rng)
            }
            ControlMode::Estimated => {
                let synthetic = poisson_stream(rates, now, self.config.horizon_sec, rng);
                self.choose_target(state, now, &synthetic, epoch_index, rng)
            }
            ControlMode::NoLookahead => {
                let total = u32::try_from(state.total()).unwrap_or(u32::MAX);
                Ok(self.record(Decision {
                    target_total: total,
                    prediction: Prediction {
                        rejection_rate: 0.0,
                        sample_count: 0,
                        outcome: PredictionOutcome::Disabled,
                    },
                }))
            }
        }
    }

    /// Scan candidate totals against the arrivals in `[now, now + horizon)`.
    pub fn choose_target<R: Rng + ?Sized>(
        &mut self,
        state: &SystemState,
        now: f64,
        arrivals: &[Arrival],
        epoch_index: u64,
        rng: &mut R,
    ) -> Result<Decision, InvariantViolation> {
        let busy = state.busy();
        let lower = busy.max(self.config.pool_min);
        let upper = lower.max(busy.saturating_add(self.config.pool_max));

        let future = slice_window(arrivals, now, now + self.config.horizon_sec);
        if future.is_empty() {
            tracing::debug!(time = now, epoch = epoch_index, "no arrivals in horizon");
            return Ok(self.record(Decision {
                target_total: self.config.pool_min.max(busy),
                prediction: Prediction {
                    rejection_rate: 0.0,
                    sample_count: 0,
                    outcome: PredictionOutcome::NoFutureArrivals,
                },
            }));
        }

        let hit = match self.config.trial_rng {
            TrialRngPolicy::Shared => self.scan_shared(state, now, future, lower, upper, rng)?,
            TrialRngPolicy::Independent if self.config.parallel_trials => {
                self.scan_parallel(state, now, future, lower, upper, epoch_index)?
            }
            TrialRngPolicy::Independent => {
                self.scan_independent(state, now, future, lower, upper, epoch_index)?
            }
        };

        let decision = match hit {
            Some(trial) => Decision {
                target_total: trial.candidate,
                prediction: Prediction {
                    rejection_rate: trial.rejection_rate(),
                    sample_count: trial.arrivals,
                    outcome: PredictionOutcome::MetSlo,
                },
            },
            None => {
                tracing::debug!(
                    time = now,
                    epoch = epoch_index,
                    upper,
                    "no candidate met the SLO; falling back to upper bound"
                );
                Decision {
                    target_total: upper,
                    prediction: Prediction {
                        rejection_rate: FALLBACK_REJECTION_RATE,
                        sample_count: future.len(),
                        outcome: PredictionOutcome::Fallback,
                    },
                }
            }
        };
        Ok(self.record(decision))
    }

    /// Replay `future` on a copy of `state` with total capacity `candidate`.
    pub fn run_trial<R: Rng + ?Sized>(
        &self,
        state: &SystemState,
        now: f64,
        candidate: u32,
        future: &[Arrival],
        rng: &mut R,
    ) -> Result<TrialOutcome, InvariantViolation> {
        let mut trial = *state;
        trial.set_pool(candidate.saturating_sub(trial.busy()));

        let mut t = now;
        let mut rejections = 0;
        for arrival in future {
            self.stepper.advance(&mut trial, t, arrival.time, rng)?;
            t = arrival.time;
            let pool = candidate.saturating_sub(trial.busy());
            trial.set_pool(pool.min(self.config.pool_max));
            if inject_arrival(&mut trial, arrival.class, &self.weights, rng)?.is_rejected() {
                rejections += 1;
            }
        }

        Ok(TrialOutcome {
            candidate,
            arrivals: future.len(),
            rejections,
        })
    }

    fn meets_slo(&self, trial: &TrialOutcome) -> bool {
        trial.rejection_rate() <= self.config.slo_rejection_rate
    }

    fn scan_shared<R: Rng + ?Sized>(
        &self,
        state: &SystemState,
        now: f64,
        future: &[Arrival],
        lower: u32,
        upper: u32,
        rng: &mut R,
    ) -> Result<Option<TrialOutcome>, InvariantViolation> {
        for candidate in lower..=upper {
            let trial = self.run_trial(state, now, candidate, future, rng)?;
            tracing::trace!(candidate, rate = trial.rejection_rate(), "trial");
            if self.meets_slo(&trial) {
                return Ok(Some(trial));
            }
        }
        Ok(None)
    }

    fn independent_trial(
        &self,
        state: &SystemState,
        now: f64,
        future: &[Arrival],
        candidate: u32,
        epoch_index: u64,
    ) -> Result<TrialOutcome, InvariantViolation> {
        let mut rng =
            Xoshiro256PlusPlus::seed_from_u64(trial_seed(self.seed, epoch_index, candidate));
        self.run_trial(state, now, candidate, future, &mut rng)
    }

    fn scan_independent(
        &self,
        state: &SystemState,
        now: f64,
        future: &[Arrival],
        lower: u32,
        upper: u32,
        epoch_index: u64,
    ) -> Result<Option<TrialOutcome>, InvariantViolation> {
        for candidate in lower..=upper {
            let trial = self.independent_trial(state, now, future, candidate, epoch_index)?;
            if self.meets_slo(&trial) {
                return Ok(Some(trial));
            }
        }
        Ok(None)
    }

    /// Evaluate candidates in batches, one scoped thread per candidate.
    ///
    /// Returns the same hit as [`scan_independent`](Self::scan_independent).
    fn scan_parallel(
        &self,
        state: &SystemState,
        now: f64,
        future: &[Arrival],
        lower: u32,
        upper: u32,
        epoch_index: u64,
    ) -> Result<Option<TrialOutcome>, InvariantViolation> {
        let workers = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let candidates: Vec<u32> = (lower..=upper).collect();

        for batch in candidates.chunks(workers.max(1)) {
            let results = crossbeam::thread::scope(|scope| {
                let handles: Vec<_> = batch
                    .iter()
                    .map(|&candidate| {
                        scope.spawn(move |_| {
                            self.independent_trial(state, now, future, candidate, epoch_index)
                        })
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|p| std::panic::resume_unwind(p));

            for result in results {
                let trial = result?;
                if self.meets_slo(&trial) {
                    return Ok(Some(trial));
                }
            }
        }
        Ok(None)
    }

    fn record(&mut self, decision: Decision) -> Decision {
        self.last_prediction = Some(decision.prediction);
        decision
    }
}
