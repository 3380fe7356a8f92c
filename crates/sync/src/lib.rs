// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! duet-sync: per-room collaborative documents.
//!
//! The document is a position-identified text CRDT: concurrent inserts
//! commute because every character carries an immutable, totally
//! ordered position, and deletes tombstone by operation id. Updates and
//! full document state share one binary encoding, summarized by a
//! per-replica state vector so peers can request minimal deltas.
//!
//! [`SyncSessions`] owns the in-memory registry of room documents and
//! drives snapshotting, restoration, fan-out, and conflict recovery.
//! [`PresenceTracker`] keeps the per-room cursor/color view.

pub mod crdt;
mod presence;
mod session;

pub use crdt::{ApplyError, Doc, OpId, StateVector, Update, UpdateError};
pub use presence::{PresenceRecord, PresenceTracker, PRESENCE_IDLE_MINUTES};
pub use session::{
    AppliedUpdate, IntegrityReport, RoomMessage, SessionConfig, SyncError, SyncSessions,
};
