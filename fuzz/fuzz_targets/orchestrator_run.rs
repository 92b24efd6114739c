#![no_main]

use libfuzzer_sys::fuzz_target;
use poolsim_core::arrival::{Arrival, JobClass};
use poolsim_core::config::{ControlMode, SimConfig, TrialRngPolicy};
use poolsim_core::orchestrator::Orchestrator;

const HEADER_LEN: usize = 6;
const MAX_ARRIVALS: usize = 512;

fn config_from(header: [u8; HEADER_LEN]) -> SimConfig {
    let [mode, pool_min, pool_max, slo, rng, seed] = header;
    let mut config = SimConfig::default();
    config.controller.mode = ControlMode::ALL[usize::from(mode) % ControlMode::ALL.len()];
    config.controller.pool_min = u32::from(pool_min % 8);
    config.controller.pool_max = u32::from(pool_min % 8) + u32::from(pool_max % 24);
    config.controller.slo_rejection_rate = f64::from(slo) / 255.0;
    config.controller.control_period_sec = 1.0 + f64::from(seed % 16);
    config.controller.horizon_sec = 1.0 + f64::from(slo % 16);
    match rng % 3 {
        0 => {}
        1 => config.controller.trial_rng = TrialRngPolicy::Independent,
        _ => {
            config.controller.trial_rng = TrialRngPolicy::Independent;
            config.controller.parallel_trials = true;
        }
    }
    config.model.initial_pool = u32::from(pool_max % 16);
    config.run.seed = u64::from(seed);
    config.run.progress_every = 0;
    config
}

fuzz_target!(|data: &[u8]| {
    let Some((header, body)) = data.split_first_chunk::<HEADER_LEN>() else {
        return;
    };
    let Ok(orchestrator) = Orchestrator::new(config_from(*header)) else {
        return;
    };

    // Each 2-byte chunk: gap in tenths of a second, class selector.
    let mut t = 0.0;
    let arrivals: Vec<Arrival> = body
        .chunks_exact(2)
        .take(MAX_ARRIVALS)
        .map(|chunk| {
            t += f64::from(chunk[0]) / 10.0;
            Arrival::new(t, JobClass::ALL[usize::from(chunk[1]) % JobClass::ALL.len()])
        })
        .collect();

    let report = orchestrator
        .run(&arrivals)
        .expect("sorted finite stream under a valid config must simulate");

    let s = report.summary;
    assert_eq!(s.total_arrivals, arrivals.len() as u64);
    assert!(s.total_rejections <= s.total_arrivals);
    assert!(s.mean_idle_pool >= 0.0);
    let arrivals_sum: u64 = report.intervals.iter().map(|r| r.arrivals_in_interval).sum();
    let rejections_sum: u64 = report.intervals.iter().map(|r| r.rejections_in_interval).sum();
    assert_eq!(arrivals_sum, s.total_arrivals);
    assert_eq!(rejections_sum, s.total_rejections);
});
