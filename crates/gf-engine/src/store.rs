//! Single-slot estimate register.
//!
//! The most recent [`Estimate`] is published through a seqlock-protected
//! double buffer: readers (publishers, any number, any thread) take a
//! consistent copy without ever blocking the writer, and a torn read is
//! detected by the sequence counter and retried.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ sequence (odd = write in progress)           │
//! │ front_idx                                    │
//! │ ┌──────────────┐  ┌──────────────┐           │
//! │ │ buffer 0     │  │ buffer 1     │           │
//! │ └──────────────┘  └──────────────┘           │
//! └──────────────────────────────────────────────┘
//! ```

use crossbeam_utils::CachePadded;
use serde::{Deserialize, Serialize};
use std::cell::UnsafeCell;
use std::sync::atomic::{fence, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// A frequency estimate and the wall-clock time it was computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// Drift-corrected signal frequency in Hz.
    pub frequency_hz: f64,
    /// Wall-clock time of computation.
    pub computed_at: SystemTime,
    /// Reference interval used for the correction, in seconds.
    pub reference_period_s: f64,
    /// Measured samples the estimate was derived from.
    pub samples: usize,
}

impl Estimate {
    /// Estimate stamped with the current wall-clock time.
    #[must_use]
    pub fn now(frequency_hz: f64, reference_period_s: f64, samples: usize) -> Self {
        Self {
            frequency_hz,
            computed_at: SystemTime::now(),
            reference_period_s,
            samples,
        }
    }

    /// Computation time as fractional seconds since the Unix epoch.
    #[must_use]
    pub fn computed_at_unix(&self) -> f64 {
        unix_seconds(self.computed_at)
    }

    /// Frequency rounded to `precision` decimal places.
    #[must_use]
    pub fn rounded(&self, precision: u32) -> f64 {
        round_to(self.frequency_hz, precision)
    }
}

/// Fractional seconds since the Unix epoch; times before the epoch map to 0.
#[must_use]
pub fn unix_seconds(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Round half away from zero to `precision` decimal places.
#[must_use]
pub fn round_to(value: f64, precision: u32) -> f64 {
    let scale = 10f64.powi(precision.min(15) as i32);
    (value * scale).round() / scale
}

/// Seqlock-protected double buffer for `Copy` data.
///
/// Writers are serialized by a mutex held only for the copy; readers spin
/// only while a write is in flight.
struct SeqlockCell<T: Copy> {
    /// Sequence number (odd = write in progress).
    sequence: CachePadded<AtomicU64>,
    /// Which buffer is currently the published front (0 or 1).
    front_idx: CachePadded<AtomicU64>,
    buf0: CachePadded<UnsafeCell<T>>,
    buf1: CachePadded<UnsafeCell<T>>,
    writer: Mutex<()>,
}

// SAFETY: buffers are only written with `writer` held and only read through
// the sequence protocol, which discards any copy overlapping a write.
#[allow(unsafe_code)]
unsafe impl<T: Copy + Send> Sync for SeqlockCell<T> {}

impl<T: Copy> SeqlockCell<T> {
    fn new(initial: T) -> Self {
        Self {
            sequence: CachePadded::new(AtomicU64::new(0)),
            front_idx: CachePadded::new(AtomicU64::new(0)),
            buf0: CachePadded::new(UnsafeCell::new(initial)),
            buf1: CachePadded::new(UnsafeCell::new(initial)),
            writer: Mutex::new(()),
        }
    }

    #[allow(unsafe_code)]
    fn read(&self) -> T {
        loop {
            let seq1 = self.sequence.load(Ordering::Acquire);
            if seq1 & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }

            let front = self.front_idx.load(Ordering::Acquire);
            let cell = if front == 0 { &self.buf0 } else { &self.buf1 };
            // SAFETY: the pointer is valid for the lifetime of `self`; a copy
            // racing with a write is discarded by the sequence check below.
            let data = unsafe { std::ptr::read_volatile(cell.get()) };

            fence(Ordering::Acquire);
            let seq2 = self.sequence.load(Ordering::Relaxed);
            if seq1 == seq2 {
                return data;
            }
            std::hint::spin_loop();
        }
    }

    #[allow(unsafe_code)]
    fn write(&self, value: T) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        self.sequence.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::Release);

        let front = self.front_idx.load(Ordering::Relaxed);
        let back = if front == 0 { &self.buf1 } else { &self.buf0 };
        // SAFETY: `writer` is held, so this is the only mutable access.
        unsafe { std::ptr::write_volatile(back.get(), value) };

        self.front_idx.store(1 - front, Ordering::Release);
        self.sequence.fetch_add(1, Ordering::Release);
    }

    fn writes(&self) -> u64 {
        self.sequence.load(Ordering::Acquire) / 2
    }
}

/// Holds the latest estimate; no history is kept.
pub struct EstimateStore {
    cell: SeqlockCell<Option<Estimate>>,
}

impl std::fmt::Debug for EstimateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EstimateStore")
            .field("version", &self.version())
            .field("latest", &self.read())
            .finish()
    }
}

impl Default for EstimateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EstimateStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: SeqlockCell::new(None),
        }
    }

    /// Replace the current estimate.
    pub fn write(&self, estimate: Estimate) {
        self.cell.write(Some(estimate));
    }

    /// Latest estimate, or `None` before the first computation.
    #[inline]
    #[must_use]
    pub fn read(&self) -> Option<Estimate> {
        self.cell.read()
    }

    /// Number of writes so far; changes whenever a new estimate lands.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.cell.writes()
    }
}
