// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Execution queue event handlers.

use super::types::{QueueItem, QueueItemStatus};
use super::MaterializedState;
use duet_core::Event;

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::QueuePushed { item_id, job_id, priority, pushed_at_ms } => {
            // Idempotency: skip if item already exists
            if !state.queue_items.iter().any(|i| i.id == *item_id) {
                state.queue_items.push(QueueItem {
                    id: *item_id,
                    job_id: *job_id,
                    priority: *priority,
                    status: QueueItemStatus::Pending,
                    pushed_at_ms: *pushed_at_ms,
                    attempt: 0,
                    taken_at_ms: 0,
                    not_before_ms: 0,
                    worker: None,
                    last_error: None,
                    finished_at_ms: None,
                });
            }
        }

        Event::QueueTaken { item_id, worker, at_ms } => {
            if let Some(item) = state.queue_item_mut(item_id) {
                // Idempotency: only bump the attempt on the transition
                // into Active (prevents double-increment on replay)
                if item.status != QueueItemStatus::Active {
                    item.attempt += 1;
                }
                item.status = QueueItemStatus::Active;
                item.worker = Some(worker.clone());
                item.taken_at_ms = *at_ms;
            }
        }

        Event::QueueCompleted { item_id, at_ms } => {
            if let Some(item) = state.queue_item_mut(item_id) {
                item.status = QueueItemStatus::Completed;
                item.finished_at_ms = Some(*at_ms);
            }
        }

        Event::QueueRetried { item_id, error, not_before_ms, .. } => {
            if let Some(item) = state.queue_item_mut(item_id) {
                item.status = QueueItemStatus::Delayed;
                item.not_before_ms = *not_before_ms;
                item.last_error = Some(error.clone());
                item.worker = None;
            }
        }

        Event::QueueFailed { item_id, error, at_ms } => {
            if let Some(item) = state.queue_item_mut(item_id) {
                item.status = QueueItemStatus::Failed;
                item.last_error = Some(error.clone());
                item.finished_at_ms = Some(*at_ms);
            }
        }

        Event::QueueDropped { item_id } => {
            state.queue_items.retain(|i| i.id != *item_id);
        }

        _ => {}
    }
}
