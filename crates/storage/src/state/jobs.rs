// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Job event handlers.
//!
//! Every transition is gated on [`duet_core::JobState::can_transition`],
//! which both enforces the write-once terminal contract and makes
//! replay idempotent: re-applying a terminal event over a job that is
//! already terminal is a no-op.

use super::MaterializedState;
use duet_core::{Event, Job, JobState};

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::JobCreated { id, room_id, user_id, code, options, created_at_ms } => {
            // Idempotency: skip if job already exists
            if !state.jobs.contains_key(id) {
                state.jobs.insert(
                    *id,
                    Job::new(
                        *id,
                        *room_id,
                        user_id.clone(),
                        code.clone(),
                        options.clone(),
                        *created_at_ms,
                    ),
                );
            }
        }

        Event::JobStarted { id, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                if job.state.can_transition(JobState::Running) {
                    job.state = JobState::Running;
                    job.started_at_ms = Some(*at_ms);
                }
            }
        }

        Event::JobCompleted {
            id,
            stdout,
            stderr,
            exit_code,
            execution_time_ms,
            memory_bytes,
            at_ms,
        } => {
            if let Some(job) = state.jobs.get_mut(id) {
                if job.state.can_transition(JobState::Completed) {
                    job.state = JobState::Completed;
                    job.stdout = Some(stdout.clone());
                    job.stderr = Some(stderr.clone());
                    job.exit_code = Some(*exit_code);
                    job.execution_time_ms = Some(*execution_time_ms);
                    job.memory_bytes = *memory_bytes;
                    job.completed_at_ms = Some(*at_ms);
                }
            }
        }

        Event::JobFailed { id, stderr, exit_code, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                if job.state.can_transition(JobState::Failed) {
                    job.state = JobState::Failed;
                    job.stderr = Some(stderr.clone());
                    job.exit_code = *exit_code;
                    job.completed_at_ms = Some(*at_ms);
                }
            }
        }

        Event::JobTimedOut { id, execution_time_ms, stdout, stderr, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                if job.state.can_transition(JobState::Timeout) {
                    job.state = JobState::Timeout;
                    job.execution_time_ms = Some(*execution_time_ms);
                    job.stdout = stdout.clone();
                    job.stderr = stderr.clone();
                    job.completed_at_ms = Some(*at_ms);
                }
            }
        }

        Event::JobCancelled { id, at_ms } => {
            if let Some(job) = state.jobs.get_mut(id) {
                if job.state.can_transition(JobState::Cancelled) {
                    job.state = JobState::Cancelled;
                    job.completed_at_ms = Some(*at_ms);
                }
            }
        }

        Event::JobDeleted { id } => {
            state.jobs.remove(id);
            state.queue_items.retain(|i| i.job_id != *id);
        }

        _ => {}
    }
}
