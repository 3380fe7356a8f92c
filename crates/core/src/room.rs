// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Room record and join-key generation.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a collaboration room.
    pub struct RoomId("rm-");
}

/// Length of the externally visible join key.
pub const JOIN_KEY_LEN: usize = 12;

/// Alphabet for join keys: uppercase alphanumeric only.
const JOIN_KEY_ALPHABET: [char; 36] = [
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Externally visible 12-character room key a user types to join.
///
/// Always matches `^[A-Z0-9]{12}$`; [`JoinKey::parse`] rejects anything else.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JoinKey(String);

impl JoinKey {
    /// Generate a fresh uniformly-random key.
    ///
    /// Uniqueness is the store's concern (generation is retried on
    /// collision there); this only guarantees shape.
    pub fn generate() -> Self {
        Self(nanoid::nanoid!(JOIN_KEY_LEN, &JOIN_KEY_ALPHABET))
    }

    /// Validate and wrap a caller-supplied key.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() == JOIN_KEY_LEN
            && s.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JoinKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A collaboration room.
///
/// `participant_count` always equals the number of participants with
/// `is_active = true`; the store recomputes it on every participant event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub join_key: JoinKey,
    pub created_at_ms: u64,
    pub last_activity_ms: u64,
    pub is_archived: bool,
    pub participant_count: u32,
    /// Latest plain-text rendering of the document, possibly empty.
    pub code_snapshot: String,
    /// Latest full CRDT state encoding, possibly empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crdt_state: Vec<u8>,
}

impl Room {
    pub fn new(id: RoomId, join_key: JoinKey, created_at_ms: u64) -> Self {
        Self {
            id,
            join_key,
            created_at_ms,
            last_activity_ms: created_at_ms,
            is_archived: false,
            participant_count: 0,
            code_snapshot: String::new(),
            crdt_state: Vec::new(),
        }
    }
}

#[cfg(test)]
#[path = "room_tests.rs"]
mod tests;
