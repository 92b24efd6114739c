//! Live and trial model state: idle pool, phase occupancy, entry weights.
//!
//! Every resource unit is a token that sits either in the idle pool or in one
//! of the four service phases. Tokens only move through the mutators below,
//! each of which refuses to underflow:
//!
//! ```text
//!   admit:     pool ──► phase j          (total unchanged)
//!   complete:  phase j ──► phase j+1     (total unchanged)
//!              phase 4 ──► pool          (total unchanged)
//!   resize:    pool := n                 (total changes)
//! ```

use serde::{Deserialize, Serialize};

use crate::arrival::JobClass;
use crate::error::{ConfigError, InvariantViolation};

/// Number of service phases.
pub const PHASE_COUNT: usize = 4;

/// A stage of the service pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    One,
    Two,
    Three,
    Four,
}

impl Phase {
    pub const ALL: [Self; PHASE_COUNT] = [Self::One, Self::Two, Self::Three, Self::Four];

    /// Zero-based index into occupancy arrays.
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
            Self::Three => 2,
            Self::Four => 3,
        }
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Phase number (1..=4); also the per-token completion-rate multiplier.
    #[must_use]
    pub fn number(self) -> u32 {
        self.index() as u32 + 1
    }

    /// Where a token goes when this phase completes; `None` means the pool.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::One => Some(Self::Two),
            Self::Two => Some(Self::Three),
            Self::Three => Some(Self::Four),
            Self::Four => None,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Ph{}", self.number())
    }
}

/// Idle pool plus per-phase occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemState {
    pool: u32,
    phases: [u32; PHASE_COUNT],
}

impl SystemState {
    /// A state with `pool` idle units and nothing in service.
    #[must_use]
    pub fn with_pool(pool: u32) -> Self {
        Self {
            pool,
            phases: [0; PHASE_COUNT],
        }
    }

    #[must_use]
    pub fn from_parts(pool: u32, phases: [u32; PHASE_COUNT]) -> Self {
        Self { pool, phases }
    }

    #[must_use]
    pub fn pool(&self) -> u32 {
        self.pool
    }

    #[must_use]
    pub fn phases(&self) -> [u32; PHASE_COUNT] {
        self.phases
    }

    #[must_use]
    pub fn occupancy(&self, phase: Phase) -> u32 {
        self.phases[phase.index()]
    }

    /// Units in any phase.
    #[must_use]
    pub fn busy(&self) -> u32 {
        self.phases.iter().sum()
    }

    /// Units in circulation: pool plus busy.
    #[must_use]
    pub fn total(&self) -> u64 {
        u64::from(self.pool) + self.phases.iter().map(|&p| u64::from(p)).sum::<u64>()
    }

    /// Overwrite the idle pool (external resize).
    pub fn set_pool(&mut self, pool: u32) {
        self.pool = pool;
    }

    /// Move one unit from the pool into `phase`.
    pub fn admit(&mut self, phase: Phase) -> Result<(), InvariantViolation> {
        let pool = self
            .pool
            .checked_sub(1)
            .ok_or(InvariantViolation::Underflow { place: "pool" })?;
        let slot = &mut self.phases[phase.index()];
        *slot = slot
            .checked_add(1)
            .ok_or(InvariantViolation::Overflow { place: "phase" })?;
        self.pool = pool;
        Ok(())
    }

    /// Complete one unit of service in `phase`, moving it downstream.
    pub fn complete(&mut self, phase: Phase) -> Result<(), InvariantViolation> {
        let before = self.total();
        let idx = phase.index();
        self.phases[idx] = self.phases[idx]
            .checked_sub(1)
            .ok_or(InvariantViolation::Underflow {
                place: phase_place(phase),
            })?;
        match phase.next() {
            Some(next) => {
                let slot = &mut self.phases[next.index()];
                *slot = slot
                    .checked_add(1)
                    .ok_or(InvariantViolation::Overflow {
                        place: phase_place(next),
                    })?;
            }
            None => {
                self.pool = self
                    .pool
                    .checked_add(1)
                    .ok_or(InvariantViolation::Overflow { place: "pool" })?;
            }
        }
        let after = self.total();
        if before != after {
            return Err(InvariantViolation::Conservation { before, after });
        }
        Ok(())
    }
}

fn phase_place(phase: Phase) -> &'static str {
    match phase {
        Phase::One => "phase 1",
        Phase::Two => "phase 2",
        Phase::Three => "phase 3",
        Phase::Four => "phase 4",
    }
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool={}, Ph1={}, Ph2={}, Ph3={}, Ph4={}",
            self.pool, self.phases[0], self.phases[1], self.phases[2], self.phases[3]
        )
    }
}

/// Relative phase-entry weights for each job class.
///
/// A class enters phase `j` with probability `w[j] / sum(w)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntryWeights {
    pub class1: [f64; PHASE_COUNT],
    pub class2: [f64; PHASE_COUNT],
    pub class3: [f64; PHASE_COUNT],
}

impl Default for EntryWeights {
    fn default() -> Self {
        Self {
            class1: [1.0, 1.0, 1.0, 1.0],
            class2: [1.0, 2.0, 3.0, 4.0],
            class3: [4.0, 3.0, 2.0, 1.0],
        }
    }
}

impl EntryWeights {
    #[must_use]
    pub fn for_class(&self, class: JobClass) -> &[f64; PHASE_COUNT] {
        match class {
            JobClass::One => &self.class1,
            JobClass::Two => &self.class2,
            JobClass::Three => &self.class3,
        }
    }

    /// Normalized entry probabilities for a class.
    ///
    /// Only meaningful after [`validate`](Self::validate) succeeded.
    #[must_use]
    pub fn probabilities(&self, class: JobClass) -> [f64; PHASE_COUNT] {
        let w = self.for_class(class);
        let sum: f64 = w.iter().sum();
        if sum <= 0.0 {
            return [0.0; PHASE_COUNT];
        }
        w.map(|x| x / sum)
    }

    /// Reject negative, non-finite, or all-zero weight vectors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for class in JobClass::ALL {
            let w = self.for_class(class);
            if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
                return Err(ConfigError::NegativeWeight { class: class.id() });
            }
            if w.iter().sum::<f64>() <= 0.0 {
                return Err(ConfigError::DegenerateWeights { class: class.id() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admit_moves_pool_to_phase() {
        let mut s = SystemState::with_pool(2);
        s.admit(Phase::Three).unwrap();
        assert_eq!(s.pool(), 1);
        assert_eq!(s.occupancy(Phase::Three), 1);
        assert_eq!(s.busy(), 1);
        assert_eq!(s.total(), 2);
    }

    #[test]
    fn admit_from_empty_pool_underflows() {
        let mut s = SystemState::with_pool(0);
        let err = s.admit(Phase::One).unwrap_err();
        assert_eq!(err, InvariantViolation::Underflow { place: "pool" });
        assert_eq!(s, SystemState::with_pool(0));
    }

    #[test]
    fn completion_chain_returns_to_pool() {
        let mut s = SystemState::with_pool(1);
        s.admit(Phase::One).unwrap();
        for phase in Phase::ALL {
            s.complete(phase).unwrap();
            assert_eq!(s.total(), 1);
        }
        assert_eq!(s, SystemState::with_pool(1));
    }

    #[test]
    fn completing_empty_phase_is_rejected() {
        let mut s = SystemState::with_pool(3);
        let err = s.complete(Phase::Two).unwrap_err();
        assert_eq!(err, InvariantViolation::Underflow { place: "phase 2" });
    }

    #[test]
    fn completion_into_full_phase_overflows() {
        let mut s = SystemState::from_parts(0, [1, u32::MAX, 0, 0]);
        let err = s.complete(Phase::One).unwrap_err();
        assert_eq!(err, InvariantViolation::Overflow { place: "phase 2" });

        let mut s = SystemState::from_parts(u32::MAX, [0, 0, 0, 1]);
        let err = s.complete(Phase::Four).unwrap_err();
        assert_eq!(err, InvariantViolation::Overflow { place: "pool" });
    }

    #[test]
    fn phase_navigation() {
        assert_eq!(Phase::One.next(), Some(Phase::Two));
        assert_eq!(Phase::Four.next(), None);
        assert_eq!(Phase::Three.number(), 3);
        assert_eq!(Phase::from_index(3), Some(Phase::Four));
        assert_eq!(Phase::from_index(4), None);
        assert_eq!(Phase::Two.to_string(), "Ph2");
    }

    #[test]
    fn display_matches_snapshot_format() {
        let s = SystemState::from_parts(5, [1, 0, 2, 0]);
        assert_eq!(s.to_string(), "Pool=5, Ph1=1, Ph2=0, Ph3=2, Ph4=0");
    }

    #[test]
    fn default_weights_are_valid() {
        let w = EntryWeights::default();
        w.validate().unwrap();
        let p = w.probabilities(JobClass::Two);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((p[3] - 0.4).abs() < 1e-12);
    }

    #[test]
    fn zero_weights_are_degenerate() {
        let w = EntryWeights {
            class3: [0.0; PHASE_COUNT],
            ..EntryWeights::default()
        };
        assert_eq!(w.validate(), Err(ConfigError::DegenerateWeights { class: 3 }));
    }

    #[test]
    fn negative_weights_are_rejected() {
        let w = EntryWeights {
            class1: [1.0, -1.0, 1.0, 1.0],
            ..EntryWeights::default()
        };
        assert_eq!(w.validate(), Err(ConfigError::NegativeWeight { class: 1 }));
    }
}
