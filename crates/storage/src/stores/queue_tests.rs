// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

use super::*;
use crate::journal::Journal;
use duet_core::FakeClock;
use std::time::Duration;
use tempfile::tempdir;

fn setup() -> (tempfile::TempDir, QueueStore<FakeClock>, FakeClock) {
    let dir = tempdir().unwrap();
    let journal = Journal::open(dir.path()).unwrap();
    let clock = FakeClock::new();
    let store = QueueStore::new(journal, clock.clone());
    (dir, store, clock)
}

#[test]
fn fifo_within_priority_class() {
    let (_dir, store, clock) = setup();
    let first = JobId::new();
    let second = JobId::new();
    clock.set_epoch_ms(1_000);
    store.push(first, NORMAL_PRIORITY).unwrap();
    clock.set_epoch_ms(2_000);
    store.push(second, NORMAL_PRIORITY).unwrap();

    assert_eq!(store.take_next("w0").unwrap().unwrap().job_id, first);
    assert_eq!(store.take_next("w0").unwrap().unwrap().job_id, second);
    assert!(store.take_next("w0").unwrap().is_none());
}

#[test]
fn higher_priority_jumps_the_line() {
    let (_dir, store, clock) = setup();
    let normal = JobId::new();
    let urgent = JobId::new();
    clock.set_epoch_ms(1_000);
    store.push(normal, NORMAL_PRIORITY).unwrap();
    clock.set_epoch_ms(2_000);
    store.push(urgent, NORMAL_PRIORITY + 1).unwrap();

    assert_eq!(store.take_next("w0").unwrap().unwrap().job_id, urgent);
}

#[test]
fn taken_item_carries_attempt_and_worker() {
    let (_dir, store, _clock) = setup();
    store.push(JobId::new(), NORMAL_PRIORITY).unwrap();
    let item = store.take_next("worker-2").unwrap().unwrap();
    assert_eq!(item.attempt, 1);
    assert_eq!(item.worker.as_deref(), Some("worker-2"));
    assert_eq!(item.status, QueueItemStatus::Active);
}

#[test]
fn delayed_item_waits_out_backoff() {
    let (_dir, store, clock) = setup();
    store.push(JobId::new(), NORMAL_PRIORITY).unwrap();
    let item = store.take_next("w0").unwrap().unwrap();
    store.retry(&item.id, "capacity", 2_000).unwrap();

    // Backoff not elapsed
    assert!(store.take_next("w0").unwrap().is_none());
    assert_eq!(store.stats().delayed, 1);

    clock.advance(Duration::from_millis(2_500));
    let retried = store.take_next("w0").unwrap().unwrap();
    assert_eq!(retried.id, item.id);
    assert_eq!(retried.attempt, 2);
}

#[test]
fn position_ranks_waiting_items() {
    let (_dir, store, clock) = setup();
    let a = JobId::new();
    let b = JobId::new();
    clock.set_epoch_ms(1_000);
    store.push(a, NORMAL_PRIORITY).unwrap();
    clock.set_epoch_ms(2_000);
    store.push(b, NORMAL_PRIORITY).unwrap();

    assert_eq!(store.position(&a), Some(1));
    assert_eq!(store.position(&b), Some(2));

    store.take_next("w0").unwrap();
    assert_eq!(store.position(&a), None);
    assert_eq!(store.position(&b), Some(1));
}

#[test]
fn stats_count_buckets() {
    let (_dir, store, _clock) = setup();
    let done = JobId::new();
    let failed = JobId::new();
    store.push(done, NORMAL_PRIORITY).unwrap();
    store.push(failed, NORMAL_PRIORITY).unwrap();
    store.push(JobId::new(), NORMAL_PRIORITY).unwrap();

    let a = store.take_next("w0").unwrap().unwrap();
    store.complete(&a.id).unwrap();
    let b = store.take_next("w0").unwrap().unwrap();
    store.fail(&b.id, "boom").unwrap();

    let stats = store.stats();
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.waiting, 1);
    assert_eq!(stats.active, 0);
    assert_eq!(store.load(), 1);
}

#[test]
fn remove_waiting_only_touches_waiting_items() {
    let (_dir, store, _clock) = setup();
    let waiting = JobId::new();
    let active = JobId::new();
    store.push(active, NORMAL_PRIORITY).unwrap();
    let taken = store.take_next("w0").unwrap().unwrap();
    assert_eq!(taken.job_id, active);
    store.push(waiting, NORMAL_PRIORITY).unwrap();

    assert!(store.remove_waiting(&waiting).unwrap());
    assert!(!store.remove_waiting(&active).unwrap());
    assert!(store.remove_by_job(&active).unwrap());
}

#[test]
fn cleanup_finished_purges_old_terminal_entries() {
    let (_dir, store, clock) = setup();
    store.push(JobId::new(), NORMAL_PRIORITY).unwrap();
    let item = store.take_next("w0").unwrap().unwrap();
    store.complete(&item.id).unwrap();

    // Too fresh to purge
    assert_eq!(store.cleanup_finished(60).unwrap(), 0);

    clock.advance(Duration::from_secs(2 * 60 * 60));
    assert_eq!(store.cleanup_finished(60).unwrap(), 1);
    let stats = store.stats();
    assert_eq!(stats.completed, 0);
}
