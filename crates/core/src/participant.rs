// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Participant records, cursors, and the presence color palette.

use crate::room::RoomId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a (room, user) participation row.
    pub struct ParticipantId("prt-");
}

/// Fixed palette of presence colors. Assignment is deterministic per
/// user so a rejoin keeps its color.
pub const COLOR_PALETTE: [&str; 10] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#008080",
];

/// Pick a palette color for a user id (stable FNV-1a hash, mod palette size).
pub fn color_for(user_id: &str) -> &'static str {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in user_id.bytes() {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    COLOR_PALETTE[(hash % COLOR_PALETTE.len() as u64) as usize]
}

/// Editor cursor position. Lines are 1-based, columns 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub line: u32,
    pub column: u32,
}

impl Cursor {
    /// Validate the invariant `line ≥ 1`.
    pub fn is_valid(&self) -> bool {
        self.line >= 1
    }
}

/// One (room, user) participation row. At most one exists per pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub id: ParticipantId,
    pub room_id: RoomId,
    pub user_id: String,
    pub joined_at_ms: u64,
    pub last_seen_ms: u64,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
    pub color: String,
}

impl Participant {
    pub fn new(room_id: RoomId, user_id: impl Into<String>, at_ms: u64) -> Self {
        let user_id = user_id.into();
        let color = color_for(&user_id).to_string();
        Self {
            id: ParticipantId::new(),
            room_id,
            user_id,
            joined_at_ms: at_ms,
            last_seen_ms: at_ms,
            is_active: true,
            cursor: None,
            color,
        }
    }
}

#[cfg(test)]
#[path = "participant_tests.rs"]
mod tests;
