// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

use super::*;
use duet_core::FakeClock;
use std::time::Duration;

#[test]
fn allows_up_to_max_then_refuses() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(3, 60_000, clock);

    for n in 0..3 {
        let quota = limiter.check("1.2.3.4");
        assert!(quota.allowed, "hit {n}");
        assert_eq!(quota.remaining, 2 - n);
    }
    let quota = limiter.check("1.2.3.4");
    assert!(!quota.allowed);
    assert_eq!(quota.remaining, 0);
    assert!(quota.reset_secs <= 60);
}

#[test]
fn keys_are_independent() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(1, 60_000, clock);
    assert!(limiter.check("a").allowed);
    assert!(limiter.check("b").allowed);
    assert!(!limiter.check("a").allowed);
}

#[test]
fn window_resets_after_elapse() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(1, 60_000, clock.clone());
    assert!(limiter.check("a").allowed);
    assert!(!limiter.check("a").allowed);

    clock.advance(Duration::from_secs(61));
    assert!(limiter.check("a").allowed);
}

#[test]
fn stale_windows_are_expired() {
    let clock = FakeClock::new();
    let limiter = RateLimiter::new(1, 1_000, clock.clone());
    for n in 0..100 {
        limiter.check(&format!("client-{n}"));
    }
    clock.advance(Duration::from_secs(10));
    limiter.check("fresh");
    assert!(limiter.windows.lock().len() <= 2);
}
