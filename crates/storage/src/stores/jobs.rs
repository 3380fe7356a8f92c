// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Job Store: durable record of every job and its lifecycle.

use crate::journal::Journal;
use crate::stores::StoreError;
use duet_core::{Clock, Event, ExecOptions, Job, JobId, JobState, RoomId};

/// Durable job records. The single source of truth for job state;
/// workers never cache it.
#[derive(Clone)]
pub struct JobStore<C: Clock> {
    journal: Journal,
    clock: C,
}

impl<C: Clock> JobStore<C> {
    pub fn new(journal: Journal, clock: C) -> Self {
        Self { journal, clock }
    }

    /// Persist a new job in `Queued`.
    pub fn create(
        &self,
        room_id: RoomId,
        user_id: &str,
        code: &str,
        options: ExecOptions,
    ) -> Result<Job, StoreError> {
        let id = JobId::new();
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::JobCreated {
            id,
            room_id,
            user_id: user_id.to_string(),
            code: code.to_string(),
            options: options.clone(),
            created_at_ms: now,
        }])?;
        Ok(Job::new(id, room_id, user_id, code, options, now))
    }

    pub fn find_by_id(&self, id: &JobId) -> Option<Job> {
        self.journal.read(|s| s.jobs.get(id).cloned())
    }

    /// Jobs submitted by a user, newest first, up to `limit`.
    pub fn find_by_user(&self, user_id: &str, limit: usize) -> Vec<Job> {
        self.journal.read(|s| {
            let mut jobs: Vec<Job> =
                s.jobs.values().filter(|j| j.user_id == user_id).cloned().collect();
            jobs.sort_by(|a, b| b.created_at_ms.cmp(&a.created_at_ms));
            jobs.truncate(limit);
            jobs
        })
    }

    pub fn find_running_jobs(&self) -> Vec<Job> {
        self.journal.read(|s| {
            s.jobs.values().filter(|j| j.state == JobState::Running).cloned().collect()
        })
    }

    /// Count of a user's submissions inside the rolling window ending now.
    pub fn count_recent_submissions(&self, user_id: &str, window_ms: u64) -> usize {
        let cutoff = self.clock.cutoff_ms(window_ms);
        self.journal.read(|s| {
            s.jobs
                .values()
                .filter(|j| j.user_id == user_id && j.created_at_ms >= cutoff)
                .count()
        })
    }

    pub fn mark_started(&self, id: &JobId) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::JobStarted { id: *id, at_ms: now }])?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn mark_completed(
        &self,
        id: &JobId,
        stdout: &str,
        stderr: &str,
        exit_code: i32,
        execution_time_ms: u64,
        memory_bytes: Option<u64>,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::JobCompleted {
            id: *id,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            execution_time_ms,
            memory_bytes,
            at_ms: now,
        }])?;
        Ok(())
    }

    pub fn mark_failed(&self, id: &JobId, stderr: &str, exit_code: Option<i32>) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::JobFailed {
            id: *id,
            stderr: stderr.to_string(),
            exit_code,
            at_ms: now,
        }])?;
        Ok(())
    }

    pub fn mark_timeout(
        &self,
        id: &JobId,
        execution_time_ms: u64,
        stdout: Option<String>,
        stderr: Option<String>,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::JobTimedOut {
            id: *id,
            execution_time_ms,
            stdout,
            stderr,
            at_ms: now,
        }])?;
        Ok(())
    }

    /// Cancel if still non-terminal. Returns whether the write landed;
    /// a lost race against a terminal write returns `false` and the
    /// earlier terminal state stands.
    pub fn cancel(&self, id: &JobId) -> Result<bool, StoreError> {
        let now = self.clock.epoch_ms();
        let landed = self.journal.transact(|s| {
            match s.jobs.get(id) {
                Some(job) if !job.is_terminal() => {
                    (vec![Event::JobCancelled { id: *id, at_ms: now }], true)
                }
                _ => (vec![], false),
            }
        })?;
        Ok(landed)
    }

    /// Delete terminal jobs older than `days`. Returns how many went.
    pub fn delete_older_than(&self, days: u64) -> Result<usize, StoreError> {
        let cutoff = self.clock.cutoff_ms(days * 24 * 60 * 60 * 1000);
        let deleted = self.journal.transact(|s| {
            let events: Vec<Event> = s
                .jobs
                .values()
                .filter(|j| {
                    j.is_terminal() && j.completed_at_ms.map(|t| t < cutoff).unwrap_or(false)
                })
                .map(|j| Event::JobDeleted { id: j.id })
                .collect();
            let count = events.len();
            (events, count)
        })?;
        Ok(deleted)
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
