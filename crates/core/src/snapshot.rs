// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Room snapshot records.

use crate::room::RoomId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a room snapshot.
    pub struct SnapshotId("snp-");
}

/// Why a snapshot was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotKind {
    /// Operation-count threshold or periodic timer.
    Auto,
    /// Explicit client request.
    Manual,
    /// Taken before archival or conflict-resolution recovery.
    Backup,
}

crate::simple_display! {
    SnapshotKind {
        Auto => "auto",
        Manual => "manual",
        Backup => "backup",
    }
}

/// Point-in-time copy of a room document.
///
/// When `crdt_state` cannot be applied during restoration, `content` of
/// the latest snapshot is the authoritative fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomSnapshot {
    pub id: SnapshotId,
    pub room_id: RoomId,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crdt_state: Option<Vec<u8>>,
    pub created_at_ms: u64,
    pub kind: SnapshotKind,
}
