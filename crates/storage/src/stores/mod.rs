// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Typed store façades over the journal.
//!
//! Value-style services: cheap to clone, no interior state of their own.
//! Each method is one journal transaction, so callers get linearizable
//! writes without holding any lock themselves.

pub mod jobs;
pub mod queue;
pub mod rooms;
pub mod snapshots;

use crate::journal::JournalError;
use thiserror::Error;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error("could not generate a unique join key after {attempts} attempts")]
    JoinKeyExhausted { attempts: u32 },
    #[error("room not found")]
    RoomNotFound,
    #[error("room is archived")]
    Archived,
}
