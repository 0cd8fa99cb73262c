//! Edge delivery and estimate reads from different threads.

use super::common::{mains_50hz, run_seconds};
use gf_common::config::{EngineConfig, SimulatedConfig};
use gf_engine::FrequencyEngine;
use gf_source::SimulatedSource;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

#[test]
fn test_readers_never_see_torn_estimates() {
    let engine = Arc::new(FrequencyEngine::new(EngineConfig::default()));
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observed = 0u64;
                while !done.load(Ordering::Acquire) {
                    if let Some(estimate) = engine.read_estimate() {
                        // Alternating signals make a mixed read visible
                        assert!(
                            (estimate.frequency_hz - 50.0).abs() < 1e-6
                                || (estimate.frequency_hz - 60.0).abs() < 1e-6,
                            "torn estimate {estimate:?}"
                        );
                        observed += 1;
                    }
                }
                observed
            })
        })
        .collect();

    // Consecutive writes alternate between 50 and 60 Hz estimates
    for round in 0..20 {
        let hz = if round % 2 == 0 { 50.0 } else { 60.0 };
        let local = FrequencyEngine::new(EngineConfig::default());
        let mut source = SimulatedSource::new(SimulatedConfig {
            signal_hz: hz,
            ..mains_50hz()
        });
        run_seconds(&mut source, &local, 2);
        if let Some(estimate) = local.read_estimate() {
            engine.store().write(estimate);
        }
    }

    done.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }
    assert!(engine.read_estimate().is_some());
}

#[test]
fn test_edges_from_source_thread_while_publishing() {
    let engine = Arc::new(FrequencyEngine::new(EngineConfig::default()));

    let producer = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || {
            let mut source = SimulatedSource::new(mains_50hz());
            run_seconds(&mut source, &engine, 60)
        })
    };

    while !producer.is_finished() {
        if let Some(estimate) = engine.read_estimate() {
            assert!((estimate.frequency_hz - 50.0).abs() < 1e-9);
        }
        let _ = engine.counters();
        let _ = engine.history_len();
    }
    let delivered = producer.join().unwrap();

    assert_eq!(delivered, 61 + 6000);
    assert_eq!(engine.counters().estimates, 60);
}
