// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Room Store: rooms and their participants.

use crate::journal::Journal;
use crate::stores::StoreError;
use duet_core::participant::color_for;
use duet_core::{Clock, Cursor, Event, JoinKey, Participant, Room, RoomId};

/// How many times join-key generation retries on collision.
const JOIN_KEY_RETRIES: u32 = 10;

#[derive(Clone)]
pub struct RoomStore<C: Clock> {
    journal: Journal,
    clock: C,
}

impl<C: Clock> RoomStore<C> {
    pub fn new(journal: Journal, clock: C) -> Self {
        Self { journal, clock }
    }

    /// Create a room with a globally unique join key.
    ///
    /// Generation retries up to 10 times on collision; exhaustion fails
    /// without persisting anything.
    pub fn create(&self) -> Result<Room, StoreError> {
        let now = self.clock.epoch_ms();
        let id = RoomId::new();
        let created = self.journal.transact(|s| {
            for _ in 0..JOIN_KEY_RETRIES {
                let key = JoinKey::generate();
                if s.find_room_by_key(key.as_str()).is_none() {
                    let event = Event::RoomCreated {
                        id,
                        join_key: key.as_str().to_string(),
                        created_at_ms: now,
                    };
                    return (vec![event], Some(Room::new(id, key, now)));
                }
            }
            (vec![], None)
        })?;
        created.ok_or(StoreError::JoinKeyExhausted { attempts: JOIN_KEY_RETRIES })
    }

    pub fn find_by_id(&self, id: &RoomId) -> Option<Room> {
        self.journal.read(|s| s.rooms.get(id).cloned())
    }

    pub fn find_by_join_key(&self, join_key: &JoinKey) -> Option<Room> {
        self.journal.read(|s| s.find_room_by_key(join_key.as_str()).cloned())
    }

    /// Upsert the (room, user) participant row and mark it active.
    ///
    /// Archived rooms reject joins. On first join the color is assigned
    /// deterministically from the palette; a rejoin keeps it.
    pub fn mark_active(&self, room_id: &RoomId, user_id: &str) -> Result<Participant, StoreError> {
        let now = self.clock.epoch_ms();
        let joined = self.journal.transact(|s| {
            let Some(room) = s.rooms.get(room_id) else {
                return (vec![], Err(StoreError::RoomNotFound));
            };
            if room.is_archived {
                return (vec![], Err(StoreError::Archived));
            }
            let color = s
                .get_participant(room_id, user_id)
                .map(|p| p.color.clone())
                .unwrap_or_else(|| color_for(user_id).to_string());
            let event = Event::ParticipantJoined {
                room_id: *room_id,
                user_id: user_id.to_string(),
                color,
                at_ms: now,
            };
            (vec![event], Ok(()))
        })?;
        joined?;
        self.journal
            .read(|s| s.get_participant(room_id, user_id).cloned())
            .ok_or(StoreError::RoomNotFound)
    }

    pub fn mark_inactive(&self, room_id: &RoomId, user_id: &str) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::ParticipantLeft {
            room_id: *room_id,
            user_id: user_id.to_string(),
            at_ms: now,
        }])?;
        Ok(())
    }

    pub fn update_cursor(
        &self,
        room_id: &RoomId,
        user_id: &str,
        cursor: Cursor,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::ParticipantCursor {
            room_id: *room_id,
            user_id: user_id.to_string(),
            cursor,
            at_ms: now,
        }])?;
        Ok(())
    }

    pub fn update_presence(
        &self,
        room_id: &RoomId,
        user_id: &str,
        active: bool,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::ParticipantPresence {
            room_id: *room_id,
            user_id: user_id.to_string(),
            active,
            at_ms: now,
        }])?;
        Ok(())
    }

    pub fn participants(&self, room_id: &RoomId) -> Vec<Participant> {
        self.journal.read(|s| s.participants_of(room_id).into_iter().cloned().collect())
    }

    /// Mark participants inactive whose `last_seen` is older than
    /// `minutes`. Rows are kept so a rejoin preserves its color.
    pub fn cleanup_inactive(&self, minutes: u64) -> Result<usize, StoreError> {
        let now = self.clock.epoch_ms();
        let cutoff = self.clock.cutoff_ms(minutes * 60 * 1000);
        let swept = self.journal.transact(|s| {
            let events: Vec<Event> = s
                .participants
                .values()
                .filter(|p| p.is_active && p.last_seen_ms < cutoff)
                .map(|p| Event::ParticipantLeft {
                    room_id: p.room_id,
                    user_id: p.user_id.clone(),
                    at_ms: now,
                })
                .collect();
            let count = events.len();
            (events, count)
        })?;
        Ok(swept)
    }

    /// Persist the latest document rendering onto the room row.
    /// Also refreshes `last_activity`.
    pub fn update_snapshot(
        &self,
        room_id: &RoomId,
        content: &str,
        crdt_state: Option<Vec<u8>>,
    ) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        let result = self.journal.transact(|s| {
            match s.rooms.get(room_id) {
                None => (vec![], Err(StoreError::RoomNotFound)),
                Some(room) if room.is_archived => (vec![], Err(StoreError::Archived)),
                Some(_) => (
                    vec![Event::RoomSnapshotUpdated {
                        id: *room_id,
                        content: content.to_string(),
                        crdt_state,
                        at_ms: now,
                    }],
                    Ok(()),
                ),
            }
        })?;
        result
    }

    pub fn touch_activity(&self, room_id: &RoomId) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::RoomActivity { id: *room_id, at_ms: now }])?;
        Ok(())
    }

    pub fn archive(&self, room_id: &RoomId) -> Result<(), StoreError> {
        let now = self.clock.epoch_ms();
        self.journal.append(&[Event::RoomArchived { id: *room_id, at_ms: now }])?;
        Ok(())
    }

    /// Rooms with no activity for `hours`, not yet archived.
    pub fn find_inactive_rooms(&self, hours: u64) -> Vec<Room> {
        let cutoff = self.clock.cutoff_ms(hours * 60 * 60 * 1000);
        self.journal.read(|s| {
            s.rooms
                .values()
                .filter(|r| !r.is_archived && r.last_activity_ms < cutoff)
                .cloned()
                .collect()
        })
    }

    /// Delete a room and everything it owns (participants, snapshots,
    /// jobs, queue entries).
    pub fn delete(&self, room_id: &RoomId) -> Result<(), StoreError> {
        self.journal.append(&[Event::RoomDeleted { id: *room_id }])?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "rooms_tests.rs"]
mod tests;
