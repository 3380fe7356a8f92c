// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Materialized state from journal replay

mod jobs;
mod participants;
mod queue;
mod rooms;
mod snapshots;
mod types;

pub use types::{QueueItem, QueueItemStatus};

use duet_core::{Event, Job, JobId, Participant, Room, RoomId, RoomSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Composite key for the one-row-per-(room, user) participant map.
pub fn participant_key(room_id: &RoomId, user_id: &str) -> String {
    format!("{}:{}", room_id.as_str(), user_id)
}

/// Materialized state built from journal replay.
///
/// The five record families correspond to the service's durable tables:
/// rooms, participants, compile jobs, room snapshots, and the execution
/// queue. Secondary access paths (by join key, by user, by state, by
/// age) are queries over these maps.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct MaterializedState {
    pub rooms: HashMap<RoomId, Room>,
    /// Keyed by [`participant_key`]; at most one row per (room, user).
    pub participants: HashMap<String, Participant>,
    pub jobs: HashMap<JobId, Job>,
    /// Per-room snapshots, ascending by creation time.
    pub snapshots: HashMap<RoomId, Vec<RoomSnapshot>>,
    /// Durable execution queue, ascending by push time.
    pub queue_items: Vec<QueueItem>,
}

impl MaterializedState {
    /// Apply an event to derive state changes.
    ///
    /// This is the event-sourcing approach where state is derived from
    /// events. Events are facts about what happened; state is derived
    /// from those facts.
    ///
    /// # Idempotency Requirement
    ///
    /// **All event handlers MUST be idempotent.** Applying the same event
    /// twice must produce the same state as applying it once. Checkpoint
    /// recovery replays the journal tail over state that may already
    /// contain part of it.
    ///
    /// Guidelines for idempotent handlers:
    /// - Use assignment (`=`) instead of mutation (`+=`, `-=`)
    /// - Guard inserts with existence checks
    /// - Gate job-state writes on [`duet_core::JobState::can_transition`]
    /// - Recompute `participant_count` from the participant rows rather
    ///   than incrementing it
    pub fn apply_event(&mut self, event: &Event) {
        rooms::apply(self, event);
        participants::apply(self, event);
        jobs::apply(self, event);
        snapshots::apply(self, event);
        queue::apply(self, event);
    }

    pub fn get_room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn find_room_by_key(&self, join_key: &str) -> Option<&Room> {
        self.rooms.values().find(|r| r.join_key.as_str() == join_key)
    }

    pub fn get_job(&self, id: &JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn get_participant(&self, room_id: &RoomId, user_id: &str) -> Option<&Participant> {
        self.participants.get(&participant_key(room_id, user_id))
    }

    /// All participants of a room, active first, then by join time.
    pub fn participants_of(&self, room_id: &RoomId) -> Vec<&Participant> {
        let mut rows: Vec<&Participant> =
            self.participants.values().filter(|p| p.room_id == *room_id).collect();
        rows.sort_by_key(|p| (!p.is_active, p.joined_at_ms));
        rows
    }

    /// Latest snapshot of a room, if any.
    pub fn latest_snapshot(&self, room_id: &RoomId) -> Option<&RoomSnapshot> {
        self.snapshots.get(room_id).and_then(|v| v.last())
    }

    pub(crate) fn queue_item_mut(
        &mut self,
        item_id: &duet_core::event::QueueItemId,
    ) -> Option<&mut QueueItem> {
        self.queue_items.iter_mut().find(|i| i.id == *item_id)
    }

    /// Recompute a room's participant count from the participant rows.
    pub(crate) fn recompute_participant_count(&mut self, room_id: &RoomId) {
        let count = self
            .participants
            .values()
            .filter(|p| p.room_id == *room_id && p.is_active)
            .count() as u32;
        if let Some(room) = self.rooms.get_mut(room_id) {
            room.participant_count = count;
        }
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
