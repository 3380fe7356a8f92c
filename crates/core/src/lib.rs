// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! duet-core: domain types for the Duet collaborative coding service

pub mod macros;

pub mod clock;
pub mod event;
pub mod exec;
pub mod id;
pub mod job;
pub mod participant;
pub mod room;
pub mod snapshot;

pub use clock::{Clock, FakeClock, SystemClock};
pub use event::Event;
pub use exec::{
    ExecLimits, ExecOptions, ExecResult, OptionsError, OptionsPatch, parse_memory_limit,
};
#[cfg(any(test, feature = "test-support"))]
pub use job::JobBuilder;
pub use job::{Job, JobId, JobState};
pub use participant::{Cursor, Participant, ParticipantId, COLOR_PALETTE};
pub use room::{JoinKey, Room, RoomId, JOIN_KEY_LEN};
pub use snapshot::{RoomSnapshot, SnapshotId, SnapshotKind};
