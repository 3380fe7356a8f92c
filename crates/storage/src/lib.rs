// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! duet-storage: durable journal, materialized state, and store façades.
//!
//! Every mutation is an [`duet_core::Event`] appended to a JSON-lines
//! write-ahead journal and applied to the in-memory [`MaterializedState`].
//! A periodic checkpoint persists the full state (zstd-compressed JSON)
//! tagged with the journal sequence; recovery loads the checkpoint and
//! replays the journal tail. One mutex guards append+apply, which makes
//! every store write linearizable.

mod checkpoint;
mod journal;
mod state;
mod stores;
mod wal;

pub use checkpoint::{load_checkpoint, Checkpoint, CheckpointError, CURRENT_CHECKPOINT_VERSION};
pub use journal::{Journal, JournalError};
pub use state::{participant_key, MaterializedState, QueueItem, QueueItemStatus};
pub use stores::jobs::JobStore;
pub use stores::StoreError;
pub use stores::queue::{QueueStats, QueueStore, NORMAL_PRIORITY};
pub use stores::rooms::RoomStore;
pub use stores::snapshots::{SnapshotStore, MAX_SNAPSHOTS_PER_ROOM};
pub use wal::{rotate_bak_path, Wal, WalEntry, WalError};
