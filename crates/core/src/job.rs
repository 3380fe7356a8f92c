// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Job record and state machine.

use crate::exec::ExecOptions;
use crate::room::RoomId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a compile/execute submission.
    pub struct JobId("job-");
}

/// Lifecycle state of a job.
///
/// Only `Queued` and `Running` are non-terminal. Terminal states are
/// write-once: the store refuses any transition out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Queued | JobState::Running)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    ///
    /// Queued may advance to Running or jump straight to a terminal state
    /// (cancellation, supervisor timeout). Running advances only to a
    /// terminal state. Terminal states never change.
    pub fn can_transition(&self, next: JobState) -> bool {
        match self {
            JobState::Queued => next != JobState::Queued,
            JobState::Running => next.is_terminal(),
            _ => false,
        }
    }
}

crate::simple_display! {
    JobState {
        Queued => "Queued",
        Running => "Running",
        Completed => "Completed",
        Failed => "Failed",
        Timeout => "Timeout",
        Cancelled => "Cancelled",
    }
}

/// One compile/execute submission and its observed outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub room_id: RoomId,
    /// Opaque user identifier; the core never interprets it.
    pub user_id: String,
    pub code: String,
    pub options: ExecOptions,
    pub state: JobState,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

impl Job {
    pub fn new(
        id: JobId,
        room_id: RoomId,
        user_id: impl Into<String>,
        code: impl Into<String>,
        options: ExecOptions,
        created_at_ms: u64,
    ) -> Self {
        Self {
            id,
            room_id,
            user_id: user_id.into(),
            code: code.into(),
            options,
            state: JobState::Queued,
            created_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
            stdout: None,
            stderr: None,
            exit_code: None,
            execution_time_ms: None,
            memory_bytes: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            user_id: String = "user-1",
            code: String = "int main() { return 0; }",
        }
        set {
            id: JobId = JobId::new(),
            room_id: RoomId = crate::room::RoomId::new(),
            options: ExecOptions = ExecOptions::default(),
            state: JobState = JobState::Queued,
            created_at_ms: u64 = 1_000_000,
        }
        option {
            started_at_ms: u64 = None,
            completed_at_ms: u64 = None,
            stdout: String = None,
            stderr: String = None,
            exit_code: i32 = None,
            execution_time_ms: u64 = None,
            memory_bytes: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
