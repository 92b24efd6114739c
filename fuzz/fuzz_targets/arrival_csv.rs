#![no_main]

use libfuzzer_sys::fuzz_target;
use poolsim_core::config::SimConfig;
use poolsim_core::orchestrator::Orchestrator;
use poolsim_core::report::read_arrivals;

fuzz_target!(|data: &[u8]| {
    if data.len() > 16_384 {
        return;
    }
    let Ok(load) = read_arrivals(data) else {
        return;
    };
    assert!(load.arrivals.iter().all(|a| (1..=3).contains(&a.class.id())));

    // Unsorted or non-finite streams must be refused, never panic.
    let mut config = SimConfig::default();
    config.run.progress_every = 0;
    let Ok(orchestrator) = Orchestrator::new(config) else {
        return;
    };
    if load.arrivals.len() <= 256 {
        let _ = orchestrator.run(&load.arrivals);
    }
});
