// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Background supervisor: stuck-job scans, reaper sweeps, cleanup.
//!
//! Every loop logs failures and keeps going; none of them ever stops
//! until shutdown.

use crate::dispatch::{job_is_terminal, Dispatcher};
use crate::state::AppState;
use duet_core::{Clock, JobState, SnapshotKind};
use duet_sandbox::SandboxRunner;
use duet_sync::PRESENCE_IDLE_MINUTES;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Stuck-job scan cadence.
const STUCK_SCAN_INTERVAL: Duration = Duration::from_secs(30);

/// Grace beyond `wallTimeoutMs` before a Running job is forced to
/// Timeout.
const STUCK_GRACE_MS: u64 = 30_000;

/// Pool reaper cadence.
const REAP_INTERVAL: Duration = Duration::from_secs(60);

/// Cleanup cadence (queue purge, job GC, sweeps, archival).
const CLEANUP_INTERVAL: Duration = Duration::from_secs(600);

/// Journal checkpoint cadence.
const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(300);

/// Hours without activity before a room is archived.
const ARCHIVE_AFTER_HOURS: u64 = 24;

/// Minutes of participant silence before the inactive sweep.
const PARTICIPANT_IDLE_MINUTES: u64 = 30;

/// Spawn all supervisor loops; they exit on token cancellation.
pub fn spawn<R: SandboxRunner, C: Clock + 'static>(
    state: AppState<R, C>,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    vec![
        spawn_loop("stuck-scan", STUCK_SCAN_INTERVAL, shutdown.clone(), {
            let state = state.clone();
            move || stuck_scan(&state)
        }),
        spawn_reaper(state.clone(), shutdown.clone()),
        spawn_loop("cleanup", CLEANUP_INTERVAL, shutdown.clone(), {
            let state = state.clone();
            move || cleanup(&state)
        }),
        spawn_loop("checkpoint", CHECKPOINT_INTERVAL, shutdown, {
            let state = state.clone();
            move || {
                state.journal.checkpoint().map_err(|e| e.to_string())?;
                Ok(())
            }
        }),
    ]
}

fn spawn_loop(
    name: &'static str,
    interval: Duration,
    shutdown: CancellationToken,
    mut tick: impl FnMut() -> Result<(), String> + Send + 'static,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(loop_name = name, "supervisor loop stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = tick() {
                        tracing::error!(loop_name = name, error = %e, "supervisor tick failed");
                    }
                }
            }
        }
    })
}

/// The reaper needs async (container kills), so it gets its own loop.
fn spawn_reaper<R: SandboxRunner, C: Clock + 'static>(
    state: AppState<R, C>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(REAP_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = ticker.tick() => {
                    let dispatcher = state.dispatcher.clone();
                    let jobs = dispatcher.jobs.clone();
                    dispatcher.pool().reap(move |id| job_is_terminal(&jobs, id)).await;
                }
            }
        }
    })
}

/// Grace beyond `wallTimeoutMs` for an Active queue item whose job
/// never reached Running (its lane died between take and start).
const QUEUE_ATTEMPT_GRACE_MS: u64 = 5_000;

/// Force overdue Running jobs to Timeout and drop their queue entries;
/// re-queue Active items whose delivery attempt stalled.
pub fn stuck_scan<R: SandboxRunner, C: Clock + 'static>(
    state: &AppState<R, C>,
) -> Result<(), String> {
    let now = state.clock.epoch_ms();
    for job in state.dispatcher.jobs.find_running_jobs() {
        let Some(started) = job.started_at_ms else { continue };
        let deadline = started + job.options.wall_timeout_ms + STUCK_GRACE_MS;
        if now > deadline {
            tracing::warn!(job_id = %job.id, started, now, "job overdue, forcing timeout");
            state
                .dispatcher
                .jobs
                .mark_timeout(&job.id, now.saturating_sub(started), None, None)
                .map_err(|e| e.to_string())?;
            state
                .dispatcher
                .queue
                .remove_by_job(&job.id)
                .map_err(|e| e.to_string())?;
        }
    }

    // Per-attempt queue timeout: taken but the job is still Queued past
    // wallTimeoutMs + grace means the attempt was lost.
    let stalled: Vec<duet_core::event::QueueItemId> = state.journal.read(|s| {
        s.queue_items
            .iter()
            .filter(|i| {
                i.status == duet_storage::QueueItemStatus::Active
                    && i.taken_at_ms > 0
                    && s.jobs
                        .get(&i.job_id)
                        .map(|j| {
                            j.state == JobState::Queued
                                && now > i.taken_at_ms
                                    + j.options.wall_timeout_ms
                                    + QUEUE_ATTEMPT_GRACE_MS
                        })
                        .unwrap_or(false)
            })
            .map(|i| i.id)
            .collect()
    });
    for item_id in stalled {
        tracing::warn!(item_id = %item_id, "queue attempt stalled, re-queueing");
        state
            .dispatcher
            .queue
            .retry(&item_id, "delivery attempt timed out", 0)
            .map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Periodic cleanup: queue purge, job GC, participant and presence
/// sweeps, room archival.
pub fn cleanup<R: SandboxRunner, C: Clock + 'static>(
    state: &AppState<R, C>,
) -> Result<(), String> {
    let (purged, deleted) = state.dispatcher.cleanup().map_err(|e| e.to_string())?;
    let swept = state
        .rooms
        .cleanup_inactive(PARTICIPANT_IDLE_MINUTES)
        .map_err(|e| e.to_string())?;
    let presence_swept = state.presence.sweep(PRESENCE_IDLE_MINUTES);

    let mut archived = 0;
    for room in state.rooms.find_inactive_rooms(ARCHIVE_AFTER_HOURS) {
        archive_room(state, &room).map_err(|e| e.to_string())?;
        archived += 1;
    }

    if purged + deleted + swept + presence_swept + archived > 0 {
        tracing::info!(purged, deleted, swept, presence_swept, archived, "cleanup pass done");
    }
    Ok(())
}

/// Archive one room: Backup snapshot first, then drop the live session
/// and flip the flag.
fn archive_room<R: SandboxRunner, C: Clock + 'static>(
    state: &AppState<R, C>,
    room: &duet_core::Room,
) -> Result<(), String> {
    // Snapshot from the live document when one exists, else from the
    // persisted room row.
    if state.sessions.active_rooms().contains(&room.id) {
        state
            .sessions
            .create_snapshot(&room.id, SnapshotKind::Backup)
            .map_err(|e| e.to_string())?;
        state.sessions.cleanup_room(&room.id).map_err(|e| e.to_string())?;
    } else {
        let crdt_state = (!room.crdt_state.is_empty()).then(|| room.crdt_state.clone());
        state
            .snapshots
            .create(&room.id, &room.code_snapshot, crdt_state, SnapshotKind::Backup)
            .map_err(|e| e.to_string())?;
    }
    state.presence.drop_room(&room.id);
    state.rooms.archive(&room.id).map_err(|e| e.to_string())?;
    tracing::info!(room_id = %room.id, "room archived after inactivity");
    Ok(())
}

/// Graceful shutdown: stop intake, drain workers, stop sandboxes,
/// flush a final checkpoint.
pub async fn shutdown<R: SandboxRunner, C: Clock + 'static>(
    state: &AppState<R, C>,
    dispatcher: &Arc<Dispatcher<R, C>>,
    workers: Vec<tokio::task::JoinHandle<()>>,
    drain_timeout: Duration,
) {
    tracing::info!("shutting down: draining workers");
    let drain = async {
        for handle in workers {
            let _ = handle.await;
        }
    };
    if tokio::time::timeout(drain_timeout, drain).await.is_err() {
        tracing::warn!("worker drain timed out");
    }

    dispatcher.pool().shutdown().await;

    for room_id in state.sessions.active_rooms() {
        if let Err(e) = state.sessions.cleanup_room(&room_id) {
            tracing::warn!(room_id = %room_id, error = %e, "room cleanup failed during shutdown");
        }
    }

    if let Err(e) = state.journal.append(&[duet_core::Event::Shutdown]) {
        tracing::warn!(error = %e, "failed to journal shutdown");
    }
    if let Err(e) = state.journal.checkpoint() {
        tracing::warn!(error = %e, "final checkpoint failed");
    }
    tracing::info!("shutdown complete");
}

/// Whether a Running job would be considered stuck at `now`.
pub fn is_overdue(job: &duet_core::Job, now: u64) -> bool {
    job.state == JobState::Running
        && job
            .started_at_ms
            .map(|started| now > started + job.options.wall_timeout_ms + STUCK_GRACE_MS)
            .unwrap_or(false)
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
