//! poolsim-core: Core library for poolsim
//!
//! A discrete-event simulator of a resource pool serving three job classes
//! through a four-phase service pipeline, closed by a predictive controller
//! that resizes the pool to meet a rejection-rate SLO.
//!
//! # Architecture
//!
//! ```text
//! arrivals ─► Orchestrator ─► StochasticStepper ─► SystemState
//!                  │  ▲                 ▲
//!   every period   ▼  │ target          │ forward trials
//!        SlidingRateEstimator ─► AdmissionController
//!                  │
//!                  ▼
//!        IntervalRecord / SliSummary ─► report (CSV, JSON)
//! ```
//!
//! # Modules
//!
//! - `arrival`: arrival records and sorted-stream helpers
//! - `rate_estimator`: sliding-window per-class rate estimation
//! - `state`: pool and phase occupancy, entry weights
//! - `stepper`: competing-exponential dynamics and arrival injection
//! - `controller`: candidate scan for the capacity target
//! - `orchestrator`: the run loop and its records
//! - `service`: analytic mean-service helpers
//! - `workload`: synthetic arrival generators
//! - `report`: CSV and JSON input/output
//! - `config`: TOML configuration
//! - `logging`: tracing subscriber setup
//! - `error`: error types with remediation
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod arrival;
pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod rate_estimator;
pub mod report;
pub mod service;
pub mod state;
pub mod stepper;
pub mod workload;

pub use arrival::{Arrival, JobClass};
pub use config::SimConfig;
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, RunReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
