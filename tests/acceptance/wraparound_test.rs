//! Runs that cross the 32-bit microsecond tick wrap.

use super::common::{assert_close, mains_50hz, recording_engine, run_seconds};
use gf_common::config::{EngineConfig, SimulatedConfig};
use gf_source::SimulatedSource;

#[test]
fn test_estimates_stable_across_tick_wrap() {
    let (engine, estimates) = recording_engine(EngineConfig::default());
    let mut source = SimulatedSource::new(SimulatedConfig {
        start_tick: u32::MAX - 2_500_000,
        ..mains_50hz()
    });

    run_seconds(&mut source, &engine, 12);

    let estimates = estimates.lock().unwrap();
    assert_eq!(estimates.len(), 12);
    for estimate in estimates.iter() {
        assert_close(estimate.frequency_hz, 50.0, 1e-9);
        assert_close(estimate.reference_period_s, 1.0, 1e-9);
    }
}

#[test]
fn test_drift_correction_across_tick_wrap() {
    let (engine, estimates) = recording_engine(EngineConfig::default());
    let mut source = SimulatedSource::new(SimulatedConfig {
        start_tick: u32::MAX - 500_000,
        reference_drift_ppm: -1_000.0,
        ..mains_50hz()
    });

    run_seconds(&mut source, &engine, 8);

    let estimates = estimates.lock().unwrap();
    assert!(!estimates.is_empty());
    for estimate in estimates.iter() {
        assert_close(estimate.frequency_hz, 50.0 / 0.999, 1e-6);
    }
}
