// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Durable execution queue: priority-weighted FIFO with retry tracking.

use crate::journal::Journal;
use crate::state::{QueueItem, QueueItemStatus};
use crate::stores::StoreError;
use duet_core::event::QueueItemId;
use duet_core::{Clock, Event, JobId};
use serde::Serialize;

/// Default priority class for admitted jobs.
pub const NORMAL_PRIORITY: u8 = 5;

/// Counts per queue bucket, as reported by `queueStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

#[derive(Clone)]
pub struct QueueStore<C: Clock> {
    journal: Journal,
    clock: C,
}

impl<C: Clock> QueueStore<C> {
    pub fn new(journal: Journal, clock: C) -> Self {
        Self { journal, clock }
    }

    /// Enqueue a job. The caller has already admitted it.
    pub fn push(&self, job_id: JobId, priority: u8) -> Result<QueueItemId, StoreError> {
        let item_id = QueueItemId::new();
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::QueuePushed {
            item_id,
            job_id,
            priority,
            pushed_at_ms: now,
        }])?;
        Ok(item_id)
    }

    /// Atomically take the next ready item for a worker.
    ///
    /// Selection: highest priority, then FIFO by push time, skipping
    /// delayed items whose backoff has not elapsed. The decision and the
    /// `queue:taken` write happen in one journal transaction, so two
    /// workers can never take the same item.
    pub fn take_next(&self, worker: &str) -> Result<Option<QueueItem>, StoreError> {
        let now = self.clock.epoch_ms();
        let taken = self.journal.transact(|s| {
            let candidate = s
                .queue_items
                .iter()
                .filter(|i| match i.status {
                    QueueItemStatus::Pending => true,
                    QueueItemStatus::Delayed => i.not_before_ms <= now,
                    _ => false,
                })
                .min_by_key(|i| (std::cmp::Reverse(i.priority), i.pushed_at_ms));
            match candidate {
                Some(item) => {
                    let mut item = item.clone();
                    item.status = QueueItemStatus::Active;
                    item.attempt += 1;
                    item.taken_at_ms = now;
                    item.worker = Some(worker.to_string());
                    let event = Event::QueueTaken {
                        item_id: item.id,
                        worker: worker.to_string(),
                        at_ms: now,
                    };
                    (vec![event], Some(item))
                }
                None => (vec![], None),
            }
        })?;
        Ok(taken)
    }

    pub fn complete(&self, item_id: &QueueItemId) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::QueueCompleted { item_id: *item_id, at_ms: now }])?;
        Ok(())
    }

    /// Schedule a retry after `backoff_ms`.
    pub fn retry(
        &self,
        item_id: &QueueItemId,
        error: &str,
        backoff_ms: u64,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::QueueRetried {
            item_id: *item_id,
            error: error.to_string(),
            not_before_ms: now + backoff_ms,
            at_ms: now,
        }])?;
        Ok(())
    }

    /// Land the item in the failed bucket (attempts exhausted).
    pub fn fail(&self, item_id: &QueueItemId, error: &str) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::QueueFailed {
            item_id: *item_id,
            error: error.to_string(),
            at_ms: now,
        }])?;
        Ok(())
    }

    /// Remove a waiting item for a job. Returns whether one was removed;
    /// active or finished items are left alone.
    pub fn remove_waiting(&self, job_id: &JobId) -> Result<bool, StoreError> {
        let removed = self.journal.transact(|s| {
            match s.queue_items.iter().find(|i| i.job_id == *job_id && i.status.is_waiting()) {
                Some(item) => (vec![Event::QueueDropped { item_id: item.id }], true),
                None => (vec![], false),
            }
        })?;
        Ok(removed)
    }

    /// Drop any queue entry for a job regardless of bucket.
    pub fn remove_by_job(&self, job_id: &JobId) -> Result<bool, StoreError> {
        let removed = self.journal.transact(|s| {
            match s.queue_items.iter().find(|i| i.job_id == *job_id) {
                Some(item) => (vec![Event::QueueDropped { item_id: item.id }], true),
                None => (vec![], false),
            }
        })?;
        Ok(removed)
    }

    /// 1-based rank of a job among currently waiting items, or None if
    /// it is not waiting.
    pub fn position(&self, job_id: &JobId) -> Option<usize> {
        self.journal.read(|s| {
            let mut waiting: Vec<&QueueItem> =
                s.queue_items.iter().filter(|i| i.status.is_waiting()).collect();
            waiting.sort_by_key(|i| (std::cmp::Reverse(i.priority), i.pushed_at_ms));
            waiting.iter().position(|i| i.job_id == *job_id).map(|p| p + 1)
        })
    }

    pub fn stats(&self) -> QueueStats {
        self.journal.read(|s| {
            let mut stats = QueueStats::default();
            for item in &s.queue_items {
                match item.status {
                    QueueItemStatus::Pending => stats.waiting += 1,
                    QueueItemStatus::Delayed => stats.delayed += 1,
                    QueueItemStatus::Active => stats.active += 1,
                    QueueItemStatus::Completed => stats.completed += 1,
                    QueueItemStatus::Failed => stats.failed += 1,
                }
            }
            stats
        })
    }

    /// Items that count toward queue saturation at admission:
    /// waiting + active. Delayed items are mid-backoff and excluded.
    pub fn load(&self) -> usize {
        let stats = self.stats();
        stats.waiting + stats.active
    }

    /// Purge completed/failed entries older than `minutes`.
    pub fn cleanup_finished(&self, minutes: u64) -> Result<usize, StoreError> {
        let cutoff = self.clock.cutoff_ms(minutes * 60 * 1000);
        let purged = self.journal.transact(|s| {
            let events: Vec<Event> = s
                .queue_items
                .iter()
                .filter(|i| {
                    matches!(i.status, QueueItemStatus::Completed | QueueItemStatus::Failed)
                        && i.finished_at_ms.map(|t| t < cutoff).unwrap_or(false)
                })
                .map(|i| Event::QueueDropped { item_id: i.id })
                .collect();
            let count = events.len();
            (events, count)
        })?;
        Ok(purged)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
