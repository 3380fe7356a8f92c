// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Worker lanes: take queue items, drive the sandbox, write verdicts.

use super::{Dispatcher, MAX_ATTEMPTS, RETRY_BASE_MS};
use duet_core::Clock;
use duet_sandbox::{PoolError, SandboxRunner};
use duet_storage::QueueItem;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Idle poll interval when the queue has nothing ready.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Spawn `worker_count` lanes consuming the execution queue until the
/// token is cancelled. Returns the join handles for drain-on-shutdown.
pub fn spawn_workers<R: SandboxRunner, C: Clock + 'static>(
    dispatcher: Arc<Dispatcher<R, C>>,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..dispatcher.config.worker_count)
        .map(|n| {
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            let name = format!("worker-{n}");
            tokio::spawn(async move {
                tracing::info!(worker = %name, "worker lane started");
                loop {
                    if shutdown.is_cancelled() {
                        tracing::info!(worker = %name, "worker lane stopping");
                        return;
                    }
                    match dispatcher.queue.take_next(&name) {
                        Ok(Some(item)) => {
                            if let Err(e) = process_item(&dispatcher, &name, &item).await {
                                tracing::error!(worker = %name, item_id = %item.id, error = %e, "item processing failed");
                                // Same retry policy as in-run failures:
                                // bounded attempts, then terminal Failed.
                                if let Err(e) = retry_or_fail(&dispatcher, &item, &e).await {
                                    tracing::error!(worker = %name, item_id = %item.id, error = %e, "retry bookkeeping failed");
                                }
                            }
                        }
                        Ok(None) => {
                            tokio::select! {
                                _ = shutdown.cancelled() => {}
                                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                            }
                        }
                        Err(e) => {
                            tracing::error!(worker = %name, error = %e, "queue take failed");
                            tokio::time::sleep(POLL_INTERVAL).await;
                        }
                    }
                }
            })
        })
        .collect()
}

/// Exponential backoff for a given attempt (1-based): 2s, 4s, 8s...
pub(crate) fn backoff_ms(attempt: u32) -> u64 {
    RETRY_BASE_MS << attempt.saturating_sub(1).min(8)
}

/// Drive one queue item through the sandbox and write the verdict.
///
/// Infrastructure failures (pool capacity, setup errors) retry with
/// backoff up to [`MAX_ATTEMPTS`]; verdicts from a run that actually
/// happened are terminal on first delivery.
pub(crate) async fn process_item<R: SandboxRunner, C: Clock>(
    dispatcher: &Dispatcher<R, C>,
    worker: &str,
    item: &QueueItem,
) -> Result<(), String> {
    let Some(job) = dispatcher.jobs.find_by_id(&item.job_id) else {
        tracing::warn!(worker, item_id = %item.id, job_id = %item.job_id, "queue item without job row, dropping");
        dispatcher.queue.remove_by_job(&item.job_id).map_err(|e| e.to_string())?;
        return Ok(());
    };

    // Cancelled (or otherwise finished) while waiting: never invoke the
    // sandbox.
    if job.is_terminal() {
        dispatcher.queue.complete(&item.id).map_err(|e| e.to_string())?;
        return Ok(());
    }

    dispatcher.jobs.mark_started(&job.id).map_err(|e| e.to_string())?;
    tracing::info!(worker, job_id = %job.id, attempt = item.attempt, "job started");

    let run = dispatcher.pool.execute_code(&job.id, &job.code, &job.options).await;

    match run {
        Err(PoolError::CapacityExceeded { .. }) | Err(PoolError::ShuttingDown) => {
            retry_or_fail(dispatcher, item, "sandbox capacity exceeded").await
        }
        Ok(result) if result.error.is_some() => {
            let error = result.error.unwrap_or_default();
            retry_or_fail(dispatcher, item, &format!("sandbox setup failed: {error}")).await
        }
        Ok(result) if result.timed_out => {
            dispatcher
                .jobs
                .mark_timeout(
                    &job.id,
                    result.execution_time_ms,
                    (!result.stdout.is_empty()).then(|| result.stdout.clone()),
                    (!result.stderr.is_empty()).then(|| result.stderr.clone()),
                )
                .map_err(|e| e.to_string())?;
            dispatcher.queue.complete(&item.id).map_err(|e| e.to_string())?;
            tracing::info!(worker, job_id = %job.id, "job timed out");
            Ok(())
        }
        Ok(result) if result.success => {
            dispatcher
                .jobs
                .mark_completed(
                    &job.id,
                    &result.stdout,
                    &result.stderr,
                    result.exit_code.unwrap_or(0),
                    result.execution_time_ms,
                    result.memory_bytes,
                )
                .map_err(|e| e.to_string())?;
            dispatcher.queue.complete(&item.id).map_err(|e| e.to_string())?;
            tracing::info!(worker, job_id = %job.id, "job completed");
            Ok(())
        }
        Ok(result) => {
            // Compilation or runtime failure: a delivered verdict.
            dispatcher
                .jobs
                .mark_failed(&job.id, &result.stderr, result.exit_code)
                .map_err(|e| e.to_string())?;
            dispatcher.queue.complete(&item.id).map_err(|e| e.to_string())?;
            tracing::info!(worker, job_id = %job.id, exit_code = ?result.exit_code, "job failed");
            Ok(())
        }
    }
}

async fn retry_or_fail<R: SandboxRunner, C: Clock>(
    dispatcher: &Dispatcher<R, C>,
    item: &QueueItem,
    error: &str,
) -> Result<(), String> {
    if item.attempt >= MAX_ATTEMPTS {
        tracing::warn!(item_id = %item.id, job_id = %item.job_id, error, "attempts exhausted");
        dispatcher
            .jobs
            .mark_failed(&item.job_id, error, None)
            .map_err(|e| e.to_string())?;
        dispatcher.queue.fail(&item.id, error).map_err(|e| e.to_string())?;
        Ok(())
    } else {
        let backoff = backoff_ms(item.attempt);
        tracing::warn!(item_id = %item.id, job_id = %item.job_id, error, backoff_ms = backoff, "retrying after backoff");
        dispatcher.queue.retry(&item.id, error, backoff).map_err(|e| e.to_string())?;
        Ok(())
    }
}

/// Whether a job has reached a terminal state (reaper callback).
pub fn job_is_terminal<C: Clock>(jobs: &duet_storage::JobStore<C>, id: &duet_core::JobId) -> bool {
    jobs.find_by_id(id).map(|j| j.state.is_terminal()).unwrap_or(true)
}
