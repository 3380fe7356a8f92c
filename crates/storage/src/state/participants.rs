// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Participant event handlers.

use super::{participant_key, MaterializedState};
use duet_core::{Event, Participant};

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::ParticipantJoined { room_id, user_id, color, at_ms } => {
            let key = participant_key(room_id, user_id);
            match state.participants.get_mut(&key) {
                Some(existing) => {
                    // Rejoin: reactivate, keep joined_at and color
                    existing.is_active = true;
                    existing.last_seen_ms = *at_ms;
                }
                None => {
                    let mut row = Participant::new(*room_id, user_id.clone(), *at_ms);
                    row.color = color.clone();
                    state.participants.insert(key, row);
                }
            }
            state.recompute_participant_count(room_id);
            if let Some(room) = state.rooms.get_mut(room_id) {
                room.last_activity_ms = *at_ms;
            }
        }

        Event::ParticipantLeft { room_id, user_id, at_ms } => {
            if let Some(row) = state.participants.get_mut(&participant_key(room_id, user_id)) {
                row.is_active = false;
                row.last_seen_ms = *at_ms;
            }
            state.recompute_participant_count(room_id);
        }

        Event::ParticipantCursor { room_id, user_id, cursor, at_ms } => {
            if let Some(row) = state.participants.get_mut(&participant_key(room_id, user_id)) {
                row.cursor = Some(*cursor);
                row.last_seen_ms = *at_ms;
            }
        }

        Event::ParticipantPresence { room_id, user_id, active, at_ms } => {
            if let Some(row) = state.participants.get_mut(&participant_key(room_id, user_id)) {
                row.is_active = *active;
                row.last_seen_ms = *at_ms;
            }
            state.recompute_participant_count(room_id);
        }

        _ => {}
    }
}
