// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Pure type definitions for materialized state records.

use duet_core::event::QueueItemId;
use duet_core::JobId;
use serde::{Deserialize, Serialize};

/// Status of a queue item through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    /// Ready for a worker to take.
    Pending,
    /// Waiting out a retry backoff; becomes takeable at `not_before_ms`.
    Delayed,
    /// Taken by a worker.
    Active,
    Completed,
    Failed,
}

impl QueueItemStatus {
    /// Items in these states count toward queue saturation.
    pub fn is_waiting(&self) -> bool {
        matches!(self, QueueItemStatus::Pending | QueueItemStatus::Delayed)
    }
}

duet_core::simple_display! {
    QueueItemStatus {
        Pending => "pending",
        Delayed => "delayed",
        Active => "active",
        Completed => "completed",
        Failed => "failed",
    }
}

/// A single item in the durable execution queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: QueueItemId,
    pub job_id: JobId,
    /// Higher runs first; FIFO within a priority class.
    pub priority: u8,
    pub status: QueueItemStatus,
    pub pushed_at_ms: u64,
    /// Number of delivery attempts so far (for retry tracking)
    #[serde(default)]
    pub attempt: u32,
    /// When the current attempt was taken (0 = never taken).
    #[serde(default)]
    pub taken_at_ms: u64,
    /// Earliest epoch-ms a delayed item may be taken again.
    #[serde(default)]
    pub not_before_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// When the item entered a terminal bucket (for cleanup).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}
