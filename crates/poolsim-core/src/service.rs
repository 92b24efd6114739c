//! Analytic mean-service helpers.
//!
//! A token entering phase `j` still has phases `j..=4` ahead of it, each an
//! exponential stage with mean `bph / k`:
//!
//! ```text
//!   residual[j] = Σ_{k=j..4} bph / k
//!   E[S_c]      = Σ_j p_c[j] * residual[j]
//!   offered     = Σ_c λ_c * E[S_c]          (Little's law: mean busy units)
//! ```

use serde::{Deserialize, Serialize};

use crate::arrival::{CLASS_COUNT, JobClass};
use crate::rate_estimator::Rates;
use crate::state::{EntryWeights, PHASE_COUNT, Phase, SystemState};

/// Class mix used when a caller supplies an all-zero mix.
pub const DEFAULT_MIX: [f64; CLASS_COUNT] = [5.0, 3.0, 2.0];

/// Mean remaining service time for a token entering each phase.
#[must_use]
pub fn phase_residual_means(bph: f64) -> [f64; PHASE_COUNT] {
    let stage = Phase::ALL.map(|p| bph / f64::from(p.number()));
    let mut residual = [0.0; PHASE_COUNT];
    let mut acc = 0.0;
    for j in (0..PHASE_COUNT).rev() {
        acc += stage[j];
        residual[j] = acc;
    }
    residual
}

/// Service-time view of a model: `bph` plus entry weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceProfile {
    bph: f64,
    weights: EntryWeights,
}

impl ServiceProfile {
    #[must_use]
    pub fn new(bph: f64, weights: EntryWeights) -> Self {
        Self { bph, weights }
    }

    #[must_use]
    pub fn residual_means(&self) -> [f64; PHASE_COUNT] {
        phase_residual_means(self.bph)
    }

    /// Mean end-to-end service time of a class.
    #[must_use]
    pub fn class_mean_service(&self, class: JobClass) -> f64 {
        let residual = self.residual_means();
        self.weights
            .probabilities(class)
            .iter()
            .zip(residual)
            .map(|(p, r)| p * r)
            .sum()
    }

    /// Mix-weighted mean service time; an all-zero mix uses [`DEFAULT_MIX`].
    #[must_use]
    pub fn mix_mean_service(&self, mix: [f64; CLASS_COUNT]) -> f64 {
        let mix = if mix.iter().sum::<f64>() <= 0.0 {
            DEFAULT_MIX
        } else {
            mix
        };
        let total: f64 = mix.iter().sum();
        JobClass::ALL
            .iter()
            .map(|&c| mix[c.index()] * self.class_mean_service(c))
            .sum::<f64>()
            / total
    }

    /// Expected busy units implied by the given arrival rates.
    #[must_use]
    pub fn offered_load(&self, rates: &Rates) -> f64 {
        JobClass::ALL
            .iter()
            .map(|&c| rates.of(c) * self.class_mean_service(c))
            .sum()
    }

    /// Mean remaining work per busy unit in `state`; zero when idle.
    #[must_use]
    pub fn state_mean_residual(&self, state: &SystemState) -> f64 {
        let busy = state.busy();
        if busy == 0 {
            return 0.0;
        }
        let residual = self.residual_means();
        Phase::ALL
            .iter()
            .map(|&p| f64::from(state.occupancy(p)) * residual[p.index()])
            .sum::<f64>()
            / f64::from(busy)
    }
}
