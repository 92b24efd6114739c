//! Sliding-window arrival-rate estimation per job class.
//!
//! Arrivals are appended in time order and kept in a FIFO. A query at time
//! `now` permanently evicts everything older than `now - window` and counts
//! what is left per class:
//!
//! > lambda_c = |{ arrivals of class c with t in [now - W, now] }| / W
//!
//! The estimator is not a queryable history: once evicted, a record is gone,
//! so queries must move forward in time.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::arrival::{Arrival, CLASS_COUNT, JobClass};

/// Smallest window used as a divisor.
const MIN_WINDOW_SEC: f64 = 1e-9;

/// Per-class arrival intensities (arrivals per second).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub lambda1: f64,
    pub lambda2: f64,
    pub lambda3: f64,
}

impl Rates {
    #[must_use]
    pub fn new(lambda1: f64, lambda2: f64, lambda3: f64) -> Self {
        Self {
            lambda1,
            lambda2,
            lambda3,
        }
    }

    /// Rate of a single class.
    #[must_use]
    pub fn of(&self, class: JobClass) -> f64 {
        match class {
            JobClass::One => self.lambda1,
            JobClass::Two => self.lambda2,
            JobClass::Three => self.lambda3,
        }
    }

    /// Combined rate over all classes.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.lambda1 + self.lambda2 + self.lambda3
    }

    #[must_use]
    pub fn as_array(&self) -> [f64; CLASS_COUNT] {
        [self.lambda1, self.lambda2, self.lambda3]
    }
}

impl std::fmt::Display for Rates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Rates{{l1={:.3},l2={:.3},l3={:.3}}}",
            self.lambda1, self.lambda2, self.lambda3
        )
    }
}

#[derive(Debug, Clone, Copy)]
struct Record {
    time: f64,
    class: JobClass,
}

/// Trailing-window per-class rate estimator.
#[derive(Debug, Clone)]
pub struct SlidingRateEstimator {
    window_sec: f64,
    records: VecDeque<Record>,
}

impl SlidingRateEstimator {
    /// Create an estimator over a trailing window of `window_sec` seconds.
    #[must_use]
    pub fn new(window_sec: f64) -> Self {
        Self {
            window_sec: window_sec.max(MIN_WINDOW_SEC),
            records: VecDeque::new(),
        }
    }

    /// Window width in seconds.
    #[must_use]
    pub fn window_sec(&self) -> f64 {
        self.window_sec
    }

    /// Record an arrival with a raw class id; ids outside 1..=3 are ignored.
    pub fn add(&mut self, time: f64, class_id: u8) {
        if let Some(class) = JobClass::from_id(class_id) {
            self.records.push_back(Record { time, class });
        }
    }

    /// Record a typed arrival.
    pub fn add_arrival(&mut self, arrival: &Arrival) {
        self.records.push_back(Record {
            time: arrival.time,
            class: arrival.class,
        });
    }

    /// Evict records older than the window and return the per-class rates.
    pub fn estimate_rates_at(&mut self, now: f64) -> Rates {
        let cutoff = now - self.window_sec;
        while self.records.front().is_some_and(|r| r.time < cutoff) {
            self.records.pop_front();
        }

        let mut counts = [0_u64; CLASS_COUNT];
        for record in &self.records {
            if record.time >= cutoff && record.time <= now {
                counts[record.class.index()] += 1;
            }
        }

        let w = self.window_sec;
        Rates::new(
            counts[0] as f64 / w,
            counts[1] as f64 / w,
            counts[2] as f64 / w,
        )
    }

    /// Records currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
