//! Run loop: merges the arrival stream with periodic control epochs.
//!
//! # Event order
//!
//! ```text
//!   clock ← first arrival,  next_epoch ← ceil(clock / period) * period
//!
//!   for each arrival a:
//!       while next_epoch <= a.time:
//!           advance(clock → next_epoch)          idle area accumulates
//!           rates ← estimator(next_epoch)
//!           decision ← controller(state, next_epoch)
//!           pool ← clamp(target - busy, pool_min, pool_max)
//!           close interval [start, next_epoch]
//!           next_epoch += period
//!       estimator.add(a)
//!       advance(clock → a.time)
//!       inject(a)                                 tally arrival / rejection
//!
//!   close final interval [start, last arrival]
//! ```
//!
//! A fresh state, estimator, controller and RNG are built for every call to
//! [`Orchestrator::run`], so replaying the same stream under the same config
//! yields the same report.

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};

use crate::arrival::{Arrival, validate_stream};
use crate::config::{ControlMode, SimConfig};
use crate::controller::{AdmissionController, Decision};
use crate::error::{ConfigError, Result};
use crate::rate_estimator::{Rates, SlidingRateEstimator};
use crate::service::ServiceProfile;
use crate::state::SystemState;
use crate::stepper::{Admission, StepDelta, StochasticStepper, inject_arrival};

/// Intervals shorter than this are treated as empty.
const MIN_INTERVAL_SEC: f64 = 1e-12;

/// What ended an interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalClose {
    ControlEpoch,
    EndOfStream,
}

impl std::fmt::Display for IntervalClose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ControlEpoch => f.write_str("epoch"),
            Self::EndOfStream => f.write_str("end"),
        }
    }
}

/// Per-interval metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub interval_start: f64,
    pub interval_end: f64,
    /// Idle pool once the interval closed (after any resize)
    pub pool_at_end: u32,
    /// Most recent target; `None` before the first epoch
    pub target_total_chosen: Option<u32>,
    /// Time of the most recent resize
    pub epoch_time: Option<f64>,
    pub arrivals_in_interval: u64,
    pub rejections_in_interval: u64,
    pub rejection_rate_in_interval: f64,
    pub mean_idle_in_interval: f64,
    pub predicted_rejection_rate: Option<f64>,
    pub prediction_sample_count: usize,
    pub closed_by: IntervalClose,
    pub estimated_rates: Option<Rates>,
    pub offered_load: Option<f64>,
}

/// Whole-run service-level indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SliSummary {
    pub total_simulated_seconds: f64,
    pub total_arrivals: u64,
    pub total_rejections: u64,
    pub rejection_rate: f64,
    pub mean_idle_pool: f64,
}

/// Everything a run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: ControlMode,
    pub seed: u64,
    pub summary: SliSummary,
    pub intervals: Vec<IntervalRecord>,
    pub final_state: SystemState,
}

/// Accumulators of the interval currently open.
#[derive(Debug, Clone, Copy)]
struct OpenInterval {
    start: f64,
    arrivals: u64,
    rejections: u64,
    idle_area: f64,
}

impl OpenInterval {
    fn starting_at(start: f64) -> Self {
        Self {
            start,
            arrivals: 0,
            rejections: 0,
            idle_area: 0.0,
        }
    }
}

/// Latest controller output, echoed on every record.
#[derive(Debug, Clone, Copy, Default)]
struct LastDecision {
    decision: Option<Decision>,
    epoch_time: Option<f64>,
    rates: Option<Rates>,
    offered_load: Option<f64>,
}

/// Drives one simulation run per call.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: SimConfig,
    stepper: StochasticStepper,
    profile: ServiceProfile,
}

impl Orchestrator {
    /// Validate `config` and build an orchestrator.
    pub fn new(config: SimConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let stepper = StochasticStepper::new(config.model.bph)?;
        let profile = ServiceProfile::new(config.model.bph, config.model.weights.clone());
        Ok(Self {
            config,
            stepper,
            profile,
        })
    }

    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Simulate `arrivals` (sorted, finite times) and report.
    pub fn run(&self, arrivals: &[Arrival]) -> Result<RunReport> {
        validate_stream(arrivals)?;

        let controller_cfg = &self.config.controller;
        let span = tracing::info_span!(
            "run",
            mode = %controller_cfg.mode,
            seed = self.config.run.seed,
            arrivals = arrivals.len()
        );
        let _guard = span.enter();

        let mut state = SystemState::with_pool(self.config.model.initial_pool);
        let (Some(first), Some(final_arrival)) = (arrivals.first(), arrivals.last()) else {
            tracing::info!("empty arrival stream; nothing to simulate");
            return Ok(self.report(SliSummary::default(), Vec::new(), state));
        };

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.run.seed);
        let mut estimator = SlidingRateEstimator::new(self.config.estimator.window_sec);
        let mut controller = AdmissionController::new(
            controller_cfg.clone(),
            self.stepper,
            self.config.model.weights.clone(),
            self.config.run.seed,
        );

        let period = controller_cfg.control_period_sec;
        let mut clock = first.time;
        let mut next_epoch = (clock / period).ceil() * period;
        let mut epoch_index: u64 = 0;

        let mut total = StepDelta::default();
        let mut total_rejections: u64 = 0;
        let mut open = OpenInterval::starting_at(clock);
        let mut latest = LastDecision::default();
        let mut intervals = Vec::new();

        for (i, arrival) in arrivals.iter().enumerate() {
            while next_epoch <= arrival.time {
                let delta = self.stepper.advance(&mut state, clock, next_epoch, &mut rng)?;
                total.absorb(delta);
                open.idle_area += delta.idle_area;
                clock = next_epoch;

                let rates = estimator.estimate_rates_at(next_epoch);
                let decision = controller.decide(
                    &state,
                    next_epoch,
                    arrivals,
                    &rates,
                    epoch_index,
                    &mut rng,
                )?;
                self.apply_resize(&mut state, decision.target_total);

                tracing::debug!(
                    time = next_epoch,
                    epoch = epoch_index,
                    target_total = decision.target_total,
                    pool = state.pool(),
                    busy = state.busy(),
                    predicted = decision.prediction.rejection_rate,
                    outcome = %decision.prediction.outcome,
                    mix_service_s = self.profile.mix_mean_service(rates.as_array()),
                    busy_residual_s = self.profile.state_mean_residual(&state),
                    "capacity decision"
                );

                latest = LastDecision {
                    decision: Some(decision),
                    epoch_time: Some(next_epoch),
                    rates: Some(rates),
                    offered_load: Some(self.profile.offered_load(&rates)),
                };
                close_interval(
                    &mut intervals,
                    open,
                    next_epoch,
                    &state,
                    &latest,
                    IntervalClose::ControlEpoch,
                );
                open = OpenInterval::starting_at(next_epoch);
                next_epoch += period;
                epoch_index += 1;
            }

            estimator.add_arrival(arrival);

            let delta = self.stepper.advance(&mut state, clock, arrival.time, &mut rng)?;
            total.absorb(delta);
            open.idle_area += delta.idle_area;
            clock = arrival.time;

            let admission =
                inject_arrival(&mut state, arrival.class, &self.config.model.weights, &mut rng)?;
            open.arrivals += 1;
            match admission {
                Admission::Admitted(phase) => {
                    tracing::trace!(time = arrival.time, class = %arrival.class, %phase, "admitted");
                }
                Admission::Rejected => {
                    open.rejections += 1;
                    total_rejections += 1;
                    tracing::trace!(time = arrival.time, class = %arrival.class, "rejected");
                }
            }

            let every = self.config.run.progress_every;
            if every > 0 && (i as u64 + 1) % every == 0 {
                tracing::info!(
                    done = i + 1,
                    of = arrivals.len(),
                    time = arrival.time,
                    rejections = total_rejections,
                    pool = state.pool(),
                    busy = state.busy(),
                    "progress"
                );
            }
        }

        close_interval(
            &mut intervals,
            open,
            final_arrival.time,
            &state,
            &latest,
            IntervalClose::EndOfStream,
        );

        let total_arrivals = arrivals.len() as u64;
        let summary = SliSummary {
            total_simulated_seconds: total.elapsed,
            total_arrivals,
            total_rejections,
            rejection_rate: total_rejections as f64 / total_arrivals as f64,
            mean_idle_pool: if total.elapsed > 0.0 {
                total.idle_area / total.elapsed
            } else {
                0.0
            },
        };

        tracing::info!(
            simulated_s = summary.total_simulated_seconds,
            arrivals = summary.total_arrivals,
            rejections = summary.total_rejections,
            rejection_rate = summary.rejection_rate,
            mean_idle = summary.mean_idle_pool,
            intervals = intervals.len(),
            last_predicted = controller.last_prediction().map(|p| p.rejection_rate),
            "run complete"
        );

        Ok(self.report(summary, intervals, state))
    }

    /// `pool = clamp(target - busy, pool_min, pool_max)`.
    fn apply_resize(&self, state: &mut SystemState, target_total: u32) {
        let cfg = &self.config.controller;
        let need = target_total.saturating_sub(state.busy());
        state.set_pool(need.clamp(cfg.pool_min, cfg.pool_max));
    }

    fn report(
        &self,
        summary: SliSummary,
        intervals: Vec<IntervalRecord>,
        final_state: SystemState,
    ) -> RunReport {
        RunReport {
            mode: self.config.controller.mode,
            seed: self.config.run.seed,
            summary,
            intervals,
            final_state,
        }
    }
}

/// Emit the record for `open` ending at `end`.
///
/// A zero-length interval is dropped only when nothing arrived in it.
fn close_interval(
    intervals: &mut Vec<IntervalRecord>,
    open: OpenInterval,
    end: f64,
    state: &SystemState,
    last: &LastDecision,
    closed_by: IntervalClose,
) {
    let length = end - open.start;
    let degenerate = length <= MIN_INTERVAL_SEC;
    if degenerate && open.arrivals == 0 {
        return;
    }

    let prediction = last.decision.map(|d| d.prediction);
    intervals.push(IntervalRecord {
        interval_start: open.start,
        interval_end: end,
        pool_at_end: state.pool(),
        target_total_chosen: last.decision.map(|d| d.target_total),
        epoch_time: last.epoch_time,
        arrivals_in_interval: open.arrivals,
        rejections_in_interval: open.rejections,
        rejection_rate_in_interval: if open.arrivals > 0 {
            open.rejections as f64 / open.arrivals as f64
        } else {
            0.0
        },
        mean_idle_in_interval: if degenerate {
            0.0
        } else {
            open.idle_area / length
        },
        predicted_rejection_rate: prediction.map(|p| p.rejection_rate),
        prediction_sample_count: prediction.map_or(0, |p| p.sample_count),
        closed_by,
        estimated_rates: last.rates,
        offered_load: last.offered_load,
    });
}
