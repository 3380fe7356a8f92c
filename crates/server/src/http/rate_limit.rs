// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Per-client-address fixed-window rate limiter for room endpoints.

use duet_core::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;

struct Window {
    started_ms: u64,
    count: usize,
}

/// Fixed-window counter keyed by client address.
pub struct RateLimiter<C: Clock> {
    max: usize,
    window_ms: u64,
    windows: Mutex<HashMap<String, Window>>,
    clock: C,
}

/// Outcome of a limiter check, carrying the response header values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub allowed: bool,
    pub limit: usize,
    pub remaining: usize,
    /// Seconds until the current window resets.
    pub reset_secs: u64,
}

impl<C: Clock> RateLimiter<C> {
    pub fn new(max: usize, window_ms: u64, clock: C) -> Self {
        Self { max, window_ms, windows: Mutex::new(HashMap::new()), clock }
    }

    /// Count one hit from `key` and report the quota.
    pub fn check(&self, key: &str) -> Quota {
        let now = self.clock.epoch_ms();
        let mut windows = self.windows.lock();

        // Opportunistic expiry keeps the map bounded by active clients.
        windows.retain(|_, w| now.saturating_sub(w.started_ms) < self.window_ms * 2);

        let window = windows
            .entry(key.to_string())
            .or_insert(Window { started_ms: now, count: 0 });
        if now.saturating_sub(window.started_ms) >= self.window_ms {
            window.started_ms = now;
            window.count = 0;
        }

        let allowed = window.count < self.max;
        if allowed {
            window.count += 1;
        }
        let elapsed = now.saturating_sub(window.started_ms);
        Quota {
            allowed,
            limit: self.max,
            remaining: self.max.saturating_sub(window.count),
            reset_secs: (self.window_ms.saturating_sub(elapsed)).div_ceil(1000),
        }
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
