// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Epoch-millisecond clock for testable time handling.
//!
//! Every durable record in the service timestamps in epoch
//! milliseconds, and every policy is a cutoff against now: rolling
//! rate windows, retry backoffs, idle sweeps, archival, retention.
//! The clock therefore deals in epoch-ms only, and `cutoff_ms` is the
//! one derived quantity all of those policies share.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A clock that provides the current time.
pub trait Clock: Clone + Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn epoch_ms(&self) -> u64;

    /// The instant `window_ms` before now, floored at the epoch.
    /// Records older than this have left the window.
    fn cutoff_ms(&self, window_ms: u64) -> u64 {
        self.epoch_ms().saturating_sub(window_ms)
    }
}

/// Real system clock
#[derive(Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Fake clock for testing with controllable time.
///
/// Starts at a fixed epoch so windows and sweeps are reproducible.
#[derive(Clone)]
pub struct FakeClock {
    epoch_ms: Arc<Mutex<u64>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self { epoch_ms: Arc::new(Mutex::new(1_000_000)) }
    }

    /// Advance the clock by the given duration
    pub fn advance(&self, duration: Duration) {
        *self.epoch_ms.lock() += duration.as_millis() as u64;
    }

    /// Set the epoch milliseconds value
    pub fn set_epoch_ms(&self, ms: u64) {
        *self.epoch_ms.lock() = ms;
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for FakeClock {
    fn epoch_ms(&self) -> u64 {
        *self.epoch_ms.lock()
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
