// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Container pool manager.
//!
//! The single place that bounds concurrent sandbox runs across all
//! dispatchers. Tracks live executions, publishes lifecycle events,
//! keeps a bounded ring of run samples, and reaps orphans.

use crate::runner::SandboxRunner;
use duet_core::{Clock, ExecOptions, ExecResult, JobId};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Bounded metrics ring: the last 60 run samples.
pub const METRICS_RING_SIZE: usize = 60;

/// How long completed samples stay before the reaper drops them.
const SAMPLE_RETENTION_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("sandbox capacity exceeded ({live}/{max} live runs)")]
    CapacityExceeded { live: usize, max: usize },
    #[error("pool is shutting down")]
    ShuttingDown,
}

/// Lifecycle stage of a pooled run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolEventKind {
    Queued,
    Started,
    Completed,
    Failed,
    Stopped,
}

duet_core::simple_display! {
    PoolEventKind {
        Queued => "queued",
        Started => "started",
        Completed => "completed",
        Failed => "failed",
        Stopped => "stopped",
    }
}

/// Published on the pool's broadcast channel for observers.
#[derive(Debug, Clone)]
pub struct PoolEvent {
    pub job_id: JobId,
    pub kind: PoolEventKind,
}

/// One finished run, kept in the metrics ring.
#[derive(Debug, Clone)]
pub struct RunSample {
    pub job_id: JobId,
    pub duration_ms: u64,
    pub success: bool,
    pub timed_out: bool,
    pub finished_at_ms: u64,
}

struct PoolState {
    live: HashMap<JobId, u64>,
    samples: VecDeque<RunSample>,
}

/// Bounds global sandbox concurrency and supervises live runs.
pub struct SandboxPool<R, C: Clock> {
    runner: Arc<R>,
    clock: C,
    max_concurrent: usize,
    state: Mutex<PoolState>,
    events: broadcast::Sender<PoolEvent>,
    shutting_down: AtomicBool,
}

impl<R: SandboxRunner, C: Clock> SandboxPool<R, C> {
    pub fn new(runner: R, clock: C, max_concurrent: usize) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            runner: Arc::new(runner),
            clock,
            max_concurrent,
            state: Mutex::new(PoolState { live: HashMap::new(), samples: VecDeque::new() }),
            events,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Subscribe to lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    fn emit(&self, job_id: &JobId, kind: PoolEventKind) {
        let _ = self.events.send(PoolEvent { job_id: *job_id, kind });
    }

    /// Run a job's code, failing fast if the pool is full.
    pub async fn execute_code(
        &self,
        job_id: &JobId,
        code: &str,
        options: &ExecOptions,
    ) -> Result<ExecResult, PoolError> {
        if self.shutting_down.load(Ordering::SeqCst) {
            return Err(PoolError::ShuttingDown);
        }
        self.emit(job_id, PoolEventKind::Queued);

        {
            let mut state = self.state.lock();
            let live = state.live.len();
            if live >= self.max_concurrent {
                tracing::warn!(job_id = %job_id, live, max = self.max_concurrent, "pool full");
                return Err(PoolError::CapacityExceeded { live, max: self.max_concurrent });
            }
            state.live.insert(*job_id, self.clock.epoch_ms());
        }
        self.emit(job_id, PoolEventKind::Started);

        let result = self.runner.run(job_id, code, options).await;

        let finished_at_ms = self.clock.epoch_ms();
        {
            let mut state = self.state.lock();
            state.live.remove(job_id);
            state.samples.push_back(RunSample {
                job_id: *job_id,
                duration_ms: result.execution_time_ms,
                success: result.success,
                timed_out: result.timed_out,
                finished_at_ms,
            });
            while state.samples.len() > METRICS_RING_SIZE {
                state.samples.pop_front();
            }
        }
        self.emit(
            job_id,
            if result.success { PoolEventKind::Completed } else { PoolEventKind::Failed },
        );

        Ok(result)
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Snapshot of the metrics ring, oldest first.
    pub fn samples(&self) -> Vec<RunSample> {
        self.state.lock().samples.iter().cloned().collect()
    }

    /// Reaper sweep: drop samples older than an hour and kill any live
    /// sandbox whose controlling job has already reached a terminal
    /// state (`is_terminal` consults the job store).
    pub async fn reap(&self, is_terminal: impl Fn(&JobId) -> bool) {
        let cutoff = self.clock.cutoff_ms(SAMPLE_RETENTION_MS);
        let orphans: Vec<JobId> = {
            let mut state = self.state.lock();
            while state
                .samples
                .front()
                .map(|s| s.finished_at_ms < cutoff)
                .unwrap_or(false)
            {
                state.samples.pop_front();
            }
            state.live.keys().filter(|id| is_terminal(id)).copied().collect()
        };

        for job_id in orphans {
            tracing::warn!(job_id = %job_id, "reaping orphan sandbox");
            self.runner.kill(&job_id).await;
            self.state.lock().live.remove(&job_id);
            self.emit(&job_id, PoolEventKind::Stopped);
        }
    }

    /// Refuse new runs, then stop and reap everything live.
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        let live: Vec<JobId> = self.state.lock().live.keys().copied().collect();
        for job_id in live {
            self.runner.kill(&job_id).await;
            self.state.lock().live.remove(&job_id);
            self.emit(&job_id, PoolEventKind::Stopped);
        }
    }

    /// Force-stop one live run (cooperative cancellation does not use
    /// this; the reaper and shutdown do).
    pub async fn stop(&self, job_id: &JobId) {
        if self.state.lock().live.contains_key(job_id) {
            self.runner.kill(job_id).await;
            self.state.lock().live.remove(job_id);
            self.emit(job_id, PoolEventKind::Stopped);
        }
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
