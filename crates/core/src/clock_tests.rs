// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

use super::*;

#[test]
fn system_clock_advances() {
    let clock = SystemClock;
    let a = clock.epoch_ms();
    let b = clock.epoch_ms();
    assert!(b >= a);
}

#[test]
fn fake_clock_advance_moves_epoch() {
    let clock = FakeClock::new();
    let start_ms = clock.epoch_ms();

    clock.advance(Duration::from_secs(30));

    assert_eq!(clock.epoch_ms() - start_ms, 30_000);
}

#[test]
fn fake_clock_set_epoch_ms() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(42);
    assert_eq!(clock.epoch_ms(), 42);
}

#[test]
fn cutoff_is_window_behind_now() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(100_000);
    assert_eq!(clock.cutoff_ms(60_000), 40_000);
}

#[test]
fn cutoff_floors_at_the_epoch() {
    let clock = FakeClock::new();
    clock.set_epoch_ms(5_000);
    assert_eq!(clock.cutoff_ms(60_000), 0);
}
