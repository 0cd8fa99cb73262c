//! Simulated source into the engine, checked against known signals.

use super::common::{assert_close, mains_50hz, run_seconds, MICROS_PER_SEC};
use gf_common::config::{Algorithm, EngineConfig, SimulatedConfig};
use gf_engine::FrequencyEngine;
use gf_source::SimulatedSource;

#[test]
fn test_clean_50hz_signal() {
    let engine = FrequencyEngine::new(EngineConfig::default());
    let mut source = SimulatedSource::new(mains_50hz());

    // First interval establishes the baseline
    source.advance(0, &engine);
    assert!(engine.read_estimate().is_none());

    run_seconds(&mut source, &engine, 30);

    let estimate = engine.read_estimate().expect("estimate after 30 s");
    assert_close(estimate.frequency_hz, 50.0, 1e-9);
    assert_close(estimate.reference_period_s, 1.0, 1e-9);
    assert_eq!(estimate.samples, 1000);

    let counters = engine.counters();
    assert_eq!(counters.reference_edges, 31);
    assert_eq!(counters.estimates, 30);
    assert_eq!(counters.measured_accepted, 3000);
    assert_eq!(counters.measured_rejected, 0);
    assert_eq!(counters.skipped_degenerate, 0);
}

#[test]
fn test_off_nominal_frequency() {
    let engine = FrequencyEngine::new(EngineConfig::default());
    let mut source = SimulatedSource::new(SimulatedConfig {
        signal_hz: 49.8,
        ..mains_50hz()
    });
    run_seconds(&mut source, &engine, 15);

    let estimate = engine.read_estimate().unwrap();
    assert_close(estimate.frequency_hz, 49.8, 1e-3);
    assert_eq!(estimate.rounded(2), 49.8);
}

#[test]
fn test_slow_reference_is_corrected() {
    // Reference runs 2 % slow: every "second" lasts 1.02 s of signal time
    let engine = FrequencyEngine::new(EngineConfig::default());
    let mut source = SimulatedSource::new(SimulatedConfig {
        reference_drift_ppm: 20_000.0,
        ..mains_50hz()
    });
    run_seconds(&mut source, &engine, 20);

    let estimate = engine.read_estimate().unwrap();
    assert_close(estimate.reference_period_s, 1.02, 1e-6);
    assert_close(estimate.frequency_hz, 50.0 / 1.02, 1e-6);
    assert_close(estimate.rounded(4), 49.0196, 1e-12);
}

#[test]
fn test_bounces_rejected_by_debouncer() {
    let engine = FrequencyEngine::new(EngineConfig::default());
    let mut source = SimulatedSource::new(SimulatedConfig {
        bounce_every: 1,
        ..mains_50hz()
    });
    run_seconds(&mut source, &engine, 10);

    let counters = engine.counters();
    assert_eq!(counters.measured_accepted, counters.measured_rejected);
    assert_close(engine.read_estimate().unwrap().frequency_hz, 50.0, 1e-9);
}

#[test]
fn test_bounces_inflate_estimate_without_debounce() {
    let engine = FrequencyEngine::new(EngineConfig {
        debounce_us: 500,
        ..EngineConfig::default()
    });
    let mut source = SimulatedSource::new(SimulatedConfig {
        bounce_every: 1,
        ..mains_50hz()
    });
    run_seconds(&mut source, &engine, 10);

    assert_eq!(engine.counters().measured_rejected, 0);
    assert!(engine.read_estimate().unwrap().frequency_hz > 90.0);
}

#[test]
fn test_count_window_algorithm() {
    let engine = FrequencyEngine::new(EngineConfig {
        algorithm: Algorithm::CountWindow,
        count_window: 10,
        ..EngineConfig::default()
    });
    let mut source = SimulatedSource::new(mains_50hz());

    run_seconds(&mut source, &engine, 5);
    assert!(engine.read_estimate().is_none());
    assert!(engine.counters().skipped_insufficient > 0);

    run_seconds(&mut source, &engine, 7);
    assert_close(engine.read_estimate().unwrap().frequency_hz, 50.0, 1e-9);
}

#[test]
fn test_no_estimate_without_measured_signal() {
    let engine = FrequencyEngine::new(EngineConfig::default());
    for second in 0..5u32 {
        engine.notify_reference_edge(gf_common::time::Tick(second * MICROS_PER_SEC as u32));
    }
    assert!(engine.read_estimate().is_none());
    assert_eq!(engine.counters().skipped_insufficient, 4);
}
