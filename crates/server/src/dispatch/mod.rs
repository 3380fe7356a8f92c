// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Execution dispatcher: admission, status, cancellation, worker lanes.
//!
//! The durable queue is the single source of truth for pending work and
//! the job store for job state; workers consult only the queue for new
//! jobs and write every transition straight to the store.

pub(crate) mod worker;

pub use worker::{job_is_terminal, spawn_workers};

use duet_core::{Clock, ExecOptions, Job, JobId, JobState, OptionsError, OptionsPatch, RoomId};
use duet_core::exec::MAX_CODE_BYTES;
use duet_sandbox::{SandboxPool, SandboxRunner};
use duet_storage::{JobStore, QueueStats, QueueStore, StoreError, NORMAL_PRIORITY};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Delivery attempts per queue item before it lands in the failed
/// bucket.
pub const MAX_ATTEMPTS: u32 = 3;

/// First retry backoff; doubles per attempt.
pub const RETRY_BASE_MS: u64 = 2_000;

/// Waiting + active items above which admission refuses new jobs.
pub const QUEUE_SATURATION: usize = 100;

#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("execution queue is full")]
    QueueFull,
    #[error("rate limit exceeded")]
    RateLimited {
        limit: usize,
        /// Seconds until the rolling window has room again.
        retry_after_secs: u64,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<OptionsError> for AdmissionError {
    fn from(e: OptionsError) -> Self {
        AdmissionError::Validation(e.to_string())
    }
}

/// Dispatcher tunables.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub limits: duet_core::ExecLimits,
    pub rate_limit_max: usize,
    pub rate_limit_window_ms: u64,
    pub worker_count: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            limits: duet_core::ExecLimits::default(),
            rate_limit_max: 5,
            rate_limit_window_ms: 60_000,
            worker_count: 3,
        }
    }
}

/// Status view returned by `jobStatus`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: JobId,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
}

/// Stored outcome, returned verbatim for terminal jobs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    pub timed_out: bool,
}

impl JobResult {
    fn from_job(job: &Job) -> Self {
        Self {
            success: job.state == JobState::Completed,
            stdout: job.stdout.clone().unwrap_or_default(),
            stderr: job.stderr.clone().unwrap_or_default(),
            exit_code: job.exit_code,
            execution_time_ms: job.execution_time_ms,
            memory_bytes: job.memory_bytes,
            timed_out: job.state == JobState::Timeout,
        }
    }
}

/// Bridges admission, the durable queue, the job store, and the pool.
pub struct Dispatcher<R, C: Clock> {
    pub jobs: JobStore<C>,
    pub queue: QueueStore<C>,
    pub(crate) pool: Arc<SandboxPool<R, C>>,
    pub(crate) config: DispatchConfig,
}

impl<R: SandboxRunner, C: Clock> Dispatcher<R, C> {
    pub fn new(
        jobs: JobStore<C>,
        queue: QueueStore<C>,
        pool: Arc<SandboxPool<R, C>>,
        config: DispatchConfig,
    ) -> Self {
        Self { jobs, queue, pool, config }
    }

    pub fn pool(&self) -> &Arc<SandboxPool<R, C>> {
        &self.pool
    }

    /// Admit a submission: saturation check, per-user rate limit,
    /// option resolution, then persist and enqueue.
    pub fn queue_job(
        &self,
        room_id: RoomId,
        user_id: &str,
        code: &str,
        options: OptionsPatch,
    ) -> Result<JobId, AdmissionError> {
        if code.len() > MAX_CODE_BYTES {
            return Err(AdmissionError::Validation(format!(
                "code exceeds {} bytes",
                MAX_CODE_BYTES
            )));
        }
        if code.is_empty() {
            return Err(AdmissionError::Validation("code is empty".into()));
        }

        if self.queue.load() >= QUEUE_SATURATION {
            return Err(AdmissionError::QueueFull);
        }

        let recent = self
            .jobs
            .count_recent_submissions(user_id, self.config.rate_limit_window_ms);
        if recent >= self.config.rate_limit_max {
            // The window slides; the oldest submission ages out within
            // one full window at worst.
            return Err(AdmissionError::RateLimited {
                limit: self.config.rate_limit_max,
                retry_after_secs: self.config.rate_limit_window_ms / 1000,
            });
        }

        let options: ExecOptions = options.resolve(&self.config.limits)?;

        let job = self.jobs.create(room_id, user_id, code, options)?;
        self.queue.push(job.id, NORMAL_PRIORITY)?;
        tracing::info!(job_id = %job.id, user_id = %user_id, "job admitted");
        Ok(job.id)
    }

    /// Status of a job: terminal results verbatim, queue rank while
    /// waiting.
    pub fn job_status(&self, job_id: &JobId) -> Option<JobStatus> {
        let job = self.jobs.find_by_id(job_id)?;
        let queue_position = match job.state {
            JobState::Queued => self.queue.position(job_id),
            _ => None,
        };
        let result = job.is_terminal().then(|| JobResult::from_job(&job));
        Some(JobStatus { job_id: *job_id, state: job.state, queue_position, result })
    }

    /// Cancel a job on behalf of a user.
    ///
    /// Queued jobs leave the queue immediately; Running jobs are
    /// cancelled cooperatively in the store — the sandbox may still
    /// finish, and whichever terminal write lands first is final.
    pub fn cancel_job(&self, job_id: &JobId, user_id: &str) -> Result<bool, StoreError> {
        let Some(job) = self.jobs.find_by_id(job_id) else {
            return Ok(false);
        };
        if job.user_id != user_id {
            return Ok(false);
        }
        match job.state {
            JobState::Queued => {
                self.queue.remove_waiting(job_id)?;
                self.jobs.cancel(job_id)
            }
            JobState::Running => self.jobs.cancel(job_id),
            _ => Ok(false),
        }
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    /// Purge old queue entries and terminal job rows.
    pub fn cleanup(&self) -> Result<(usize, usize), StoreError> {
        let purged = self.queue.cleanup_finished(60)?;
        let deleted = self.jobs.delete_older_than(7)?;
        Ok((purged, deleted))
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
