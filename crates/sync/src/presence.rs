// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Presence tracker: per-room active participants with cursors.
//!
//! Purely in-memory; the durable participant rows live in the room
//! store. Sweeps mark records inactive but never delete them, so a
//! rejoin keeps its color.

use duet_core::participant::color_for;
use duet_core::{Clock, Cursor, RoomId};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;

/// Minutes of silence after which a sweep marks a record inactive.
pub const PRESENCE_IDLE_MINUTES: u64 = 30;

/// One user's live presence in a room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
    pub active: bool,
    pub last_seen_ms: u64,
}

/// In-memory map `room → user → presence`.
pub struct PresenceTracker<C: Clock> {
    rooms: Mutex<HashMap<RoomId, HashMap<String, PresenceRecord>>>,
    clock: C,
}

impl<C: Clock> PresenceTracker<C> {
    pub fn new(clock: C) -> Self {
        Self { rooms: Mutex::new(HashMap::new()), clock }
    }

    /// Join (or rejoin) a room. The color sticks across rejoins.
    pub fn join(&self, room_id: &RoomId, user_id: &str) -> PresenceRecord {
        let now = self.clock.epoch_ms();
        let mut rooms = self.rooms.lock();
        let room = rooms.entry(*room_id).or_default();
        let record = room.entry(user_id.to_string()).or_insert_with(|| PresenceRecord {
            color: color_for(user_id).to_string(),
            cursor: None,
            active: true,
            last_seen_ms: now,
        });
        record.active = true;
        record.last_seen_ms = now;
        record.clone()
    }

    /// Mark a user inactive (disconnect or explicit leave).
    pub fn leave(&self, room_id: &RoomId, user_id: &str) {
        let now = self.clock.epoch_ms();
        if let Some(room) = self.rooms.lock().get_mut(room_id) {
            if let Some(record) = room.get_mut(user_id) {
                record.active = false;
                record.last_seen_ms = now;
            }
        }
    }

    pub fn update_cursor(&self, room_id: &RoomId, user_id: &str, cursor: Cursor) {
        let now = self.clock.epoch_ms();
        if let Some(room) = self.rooms.lock().get_mut(room_id) {
            if let Some(record) = room.get_mut(user_id) {
                record.cursor = Some(cursor);
                record.last_seen_ms = now;
            }
        }
    }

    pub fn update_presence(&self, room_id: &RoomId, user_id: &str, active: bool) {
        let now = self.clock.epoch_ms();
        if let Some(room) = self.rooms.lock().get_mut(room_id) {
            if let Some(record) = room.get_mut(user_id) {
                record.active = active;
                record.last_seen_ms = now;
            }
        }
    }

    /// All records of a room (active first, then by user id for a
    /// stable order).
    pub fn snapshot(&self, room_id: &RoomId) -> Vec<(String, PresenceRecord)> {
        let rooms = self.rooms.lock();
        let mut records: Vec<(String, PresenceRecord)> = rooms
            .get(room_id)
            .map(|room| room.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        records.sort_by(|(ua, ra), (ub, rb)| {
            rb.active.cmp(&ra.active).then_with(|| ua.cmp(ub))
        });
        records
    }

    /// Mark records inactive after `minutes` of silence. Records are
    /// kept; returns how many flipped.
    pub fn sweep(&self, minutes: u64) -> usize {
        let cutoff = self.clock.cutoff_ms(minutes * 60 * 1000);
        let mut flipped = 0;
        for room in self.rooms.lock().values_mut() {
            for record in room.values_mut() {
                if record.active && record.last_seen_ms < cutoff {
                    record.active = false;
                    flipped += 1;
                }
            }
        }
        flipped
    }

    /// Drop a room's records entirely (room cleanup).
    pub fn drop_room(&self, room_id: &RoomId) {
        self.rooms.lock().remove(room_id);
    }
}

#[cfg(test)]
#[path = "presence_tests.rs"]
mod tests;
