//! Shared helpers for acceptance tests.

#![allow(dead_code)] // Not every test module uses every helper

use gf_common::config::{EngineConfig, SimulatedConfig};
use gf_engine::{Estimate, FrequencyEngine};
use gf_source::SimulatedSource;
use std::sync::{Arc, Mutex};

pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Simulated 50 Hz signal with a perfect reference.
pub fn mains_50hz() -> SimulatedConfig {
    SimulatedConfig {
        signal_hz: 50.0,
        ..SimulatedConfig::default()
    }
}

/// Advance the source one second at a time, feeding `engine`.
pub fn run_seconds(source: &mut SimulatedSource, engine: &FrequencyEngine, seconds: u64) -> usize {
    (0..seconds)
        .map(|_| source.advance(MICROS_PER_SEC, engine))
        .sum()
}

/// Engine that records every estimate it produces.
pub fn recording_engine(config: EngineConfig) -> (FrequencyEngine, Arc<Mutex<Vec<Estimate>>>) {
    let estimates = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&estimates);
    let engine = gf_engine::EngineBuilder::new()
        .config(config)
        .on_estimate(move |e: &Estimate| sink.lock().unwrap().push(*e))
        .build();
    (engine, estimates)
}

pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "expected {expected} ± {tolerance}, got {actual}"
    );
}
