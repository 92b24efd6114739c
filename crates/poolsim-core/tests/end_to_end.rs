//! End-to-end runs through the orchestrator and the report writers.
//!
//! 1. Steady 1/s class-1 stream meets the rejection ceiling
//! 2. Interval arrival counts cover the whole stream
//! 3. Replays produce byte-identical CSV output
//! 4. Generated surge traces run cleanly in every control mode

use poolsim_core::arrival::{Arrival, JobClass};
use poolsim_core::config::{ControlMode, SimConfig, TrialRngPolicy};
use poolsim_core::orchestrator::{IntervalClose, Orchestrator, RunReport};
use poolsim_core::report::{
    read_arrivals, write_arrivals, write_intervals_csv, write_summary_csv,
};
use poolsim_core::workload::{SurgeConfig, generate_surge};

fn steady_stream(n: u32) -> Vec<Arrival> {
    (0..n)
        .map(|i| Arrival::new(f64::from(i), JobClass::One))
        .collect()
}

fn steady_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.controller.pool_max = 24;
    config.controller.slo_rejection_rate = 0.01;
    config.controller.horizon_sec = 10.0;
    config.controller.control_period_sec = 10.0;
    config
}

fn render(report: &RunReport) -> (String, String) {
    let mut intervals = Vec::new();
    write_intervals_csv(&mut intervals, &report.intervals).unwrap();
    let mut summary = Vec::new();
    write_summary_csv(&mut summary, &report.summary).unwrap();
    (
        String::from_utf8(intervals).unwrap(),
        String::from_utf8(summary).unwrap(),
    )
}

// =============================================================================
// Steady stream
// =============================================================================

#[test]
fn steady_stream_meets_rejection_ceiling() {
    // A floor of one period's worth of arrivals leaves room for every admission.
    // The floor is what keeps the ceiling: at pool_min = 1 the first-hit scan
    // misses 0.02 on most seeds.
    let mut config = steady_config();
    config.controller.pool_min = 10;
    let report = Orchestrator::new(config).unwrap().run(&steady_stream(100)).unwrap();

    assert!(report.summary.rejection_rate <= 0.02, "{:?}", report.summary);
    let arrivals: u64 = report.intervals.iter().map(|r| r.arrivals_in_interval).sum();
    assert_eq!(arrivals, 100);
    assert_eq!(report.summary.total_arrivals, 100);
    assert!((report.summary.total_simulated_seconds - 99.0).abs() < 1e-9);
}

#[test]
fn steady_stream_interval_layout() {
    let report = Orchestrator::new(steady_config())
        .unwrap()
        .run(&steady_stream(100))
        .unwrap();

    // Epochs at 0, 10, ..., 90; the one at t=0 closes an empty zero-length interval.
    assert_eq!(report.intervals.len(), 10);
    for (k, rec) in report.intervals.iter().enumerate() {
        let start = 10.0 * k as f64;
        assert_eq!(rec.interval_start, start);
        assert_eq!(rec.epoch_time, Some(start + if k < 9 { 10.0 } else { 0.0 }));
        assert_eq!(rec.arrivals_in_interval, 10);
        assert!(rec.rejections_in_interval <= rec.arrivals_in_interval);
        assert!(rec.mean_idle_in_interval >= 0.0);
        assert!(rec.target_total_chosen.is_some());
    }
    let last = report.intervals.last().unwrap();
    assert_eq!(last.closed_by, IntervalClose::EndOfStream);
    assert_eq!(last.interval_end, 99.0);
    let arrivals: u64 = report.intervals.iter().map(|r| r.arrivals_in_interval).sum();
    assert_eq!(arrivals, 100);
}

#[test]
fn lowest_floor_stays_near_the_ceiling_on_average() {
    // With pool_min = 1 the scan accepts the first candidate whose single
    // trial met the SLO, so individual runs can overshoot the ceiling.
    let stream = steady_stream(100);
    let seeds = 0..20u64;
    let mut total = 0.0;
    for seed in seeds.clone() {
        let mut config = steady_config();
        config.run.seed = seed;
        config.run.progress_every = 0;
        let report = Orchestrator::new(config).unwrap().run(&stream).unwrap();
        let arrivals: u64 = report.intervals.iter().map(|r| r.arrivals_in_interval).sum();
        assert_eq!(arrivals, 100);
        total += report.summary.rejection_rate;
    }
    let mean = total / seeds.count() as f64;
    assert!(mean < 0.15, "mean rejection rate {mean}");
}

// =============================================================================
// Replay
// =============================================================================

#[test]
fn replay_is_byte_identical() {
    let stream = generate_surge(&SurgeConfig {
        duration_sec: 120.0,
        ..SurgeConfig::default()
    })
    .unwrap();
    let orch = Orchestrator::new(SimConfig::default()).unwrap();
    let first = render(&orch.run(&stream).unwrap());
    let second = render(&orch.run(&stream).unwrap());
    assert_eq!(first, second);
}

#[test]
fn independent_trials_replay_identically_in_parallel() {
    let stream = steady_stream(60);
    let mut sequential = steady_config();
    sequential.controller.trial_rng = TrialRngPolicy::Independent;
    let mut parallel = sequential.clone();
    parallel.controller.parallel_trials = true;

    let a = Orchestrator::new(sequential).unwrap().run(&stream).unwrap();
    let b = Orchestrator::new(parallel).unwrap().run(&stream).unwrap();
    assert_eq!(render(&a), render(&b));
}

#[test]
fn arrivals_survive_the_csv_boundary() {
    let stream = generate_surge(&SurgeConfig {
        duration_sec: 60.0,
        ..SurgeConfig::default()
    })
    .unwrap();
    let mut csv = Vec::new();
    write_arrivals(&mut csv, &stream).unwrap();
    let load = read_arrivals(csv.as_slice()).unwrap();
    assert_eq!(load.skipped, 0);
    assert_eq!(load.arrivals.len(), stream.len());

    let report = Orchestrator::new(SimConfig::default())
        .unwrap()
        .run(&load.arrivals)
        .unwrap();
    assert_eq!(report.summary.total_arrivals, stream.len() as u64);
}

// =============================================================================
// Modes
// =============================================================================

#[test]
fn every_mode_runs_a_surge_trace() {
    let stream = generate_surge(&SurgeConfig {
        duration_sec: 90.0,
        ..SurgeConfig::default()
    })
    .unwrap();
    assert!(!stream.is_empty());

    for mode in ControlMode::ALL {
        let mut config = SimConfig::default();
        config.controller.mode = mode;
        let report = Orchestrator::new(config).unwrap().run(&stream).unwrap();
        assert_eq!(report.mode, mode);

        let s = report.summary;
        assert_eq!(s.total_arrivals, stream.len() as u64);
        assert!(s.total_rejections <= s.total_arrivals);
        assert!((0.0..=1.0).contains(&s.rejection_rate));
        assert!(s.mean_idle_pool >= 0.0);

        let arrivals: u64 = report.intervals.iter().map(|r| r.arrivals_in_interval).sum();
        let rejections: u64 = report.intervals.iter().map(|r| r.rejections_in_interval).sum();
        assert_eq!(arrivals, s.total_arrivals);
        assert_eq!(rejections, s.total_rejections);
    }
}

#[test]
fn idle_mean_matches_interval_weighted_average() {
    let report = Orchestrator::new(steady_config())
        .unwrap()
        .run(&steady_stream(100))
        .unwrap();
    let weighted: f64 = report
        .intervals
        .iter()
        .map(|r| r.mean_idle_in_interval * (r.interval_end - r.interval_start))
        .sum();
    let expected = weighted / report.summary.total_simulated_seconds;
    assert!((expected - report.summary.mean_idle_pool).abs() < 1e-9);
}
