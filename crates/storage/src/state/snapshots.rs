// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Room snapshot event handlers.

use super::MaterializedState;
use duet_core::{Event, RoomSnapshot};

pub(crate) fn apply(state: &mut MaterializedState, event: &Event) {
    match event {
        Event::SnapshotCreated { id, room_id, content, crdt_state, kind, at_ms } => {
            let rows = state.snapshots.entry(*room_id).or_default();
            // Idempotency: skip if snapshot already exists
            if !rows.iter().any(|s| s.id == *id) {
                rows.push(RoomSnapshot {
                    id: *id,
                    room_id: *room_id,
                    content: content.clone(),
                    crdt_state: crdt_state.clone(),
                    created_at_ms: *at_ms,
                    kind: *kind,
                });
                // Keep ascending by creation time even if events replay
                // out of order across a checkpoint boundary.
                rows.sort_by_key(|s| s.created_at_ms);
            }
        }

        Event::SnapshotPruned { room_id, keep } => {
            if let Some(rows) = state.snapshots.get_mut(room_id) {
                let keep = *keep as usize;
                if rows.len() > keep {
                    let excess = rows.len() - keep;
                    rows.drain(..excess);
                }
            }
        }

        _ => {}
    }
}
