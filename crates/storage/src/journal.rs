// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! The journal: one write path for all durable state.
//!
//! `append` takes the lock, writes the events to the WAL, flushes, and
//! applies them to the materialized state before releasing — so every
//! store write is atomic and linearizable, and readers never observe a
//! partially applied batch.

use crate::checkpoint::{load_checkpoint, Checkpoint, CheckpointError};
use crate::state::MaterializedState;
use crate::wal::{Wal, WalError};
use duet_core::Event;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Wal(#[from] WalError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}

struct JournalInner {
    wal: Wal,
    state: MaterializedState,
}

/// Shared handle to the durable journal.
#[derive(Clone)]
pub struct Journal {
    inner: Arc<Mutex<JournalInner>>,
    checkpoint_path: PathBuf,
}

impl Journal {
    /// Open the journal under `state_dir`, recovering from the latest
    /// checkpoint plus the WAL tail.
    pub fn open(state_dir: &Path) -> Result<Self, JournalError> {
        let wal_path = state_dir.join("wal").join("events.wal");
        let checkpoint_path = state_dir.join("checkpoint.json.zst");

        let mut state = MaterializedState::default();
        let mut after_seq = 0;
        if let Some(cp) = load_checkpoint(&checkpoint_path)? {
            after_seq = cp.seq;
            state = cp.state;
        }

        let wal = Wal::open(&wal_path, after_seq)?;
        let tail = wal.entries_after(after_seq)?;
        let replayed = tail.len();
        for entry in tail {
            state.apply_event(&entry.event);
        }
        tracing::info!(
            checkpoint_seq = after_seq,
            replayed,
            rooms = state.rooms.len(),
            jobs = state.jobs.len(),
            "journal recovered"
        );

        Ok(Self {
            inner: Arc::new(Mutex::new(JournalInner { wal, state })),
            checkpoint_path,
        })
    }

    /// Durably append a batch of events and apply them to state.
    pub fn append(&self, events: &[Event]) -> Result<(), JournalError> {
        if events.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        for event in events {
            inner.wal.append(event)?;
        }
        inner.wal.flush()?;
        for event in events {
            tracing::debug!(kind = event.kind(), "journal event");
            inner.state.apply_event(event);
        }
        Ok(())
    }

    /// Read from the materialized state under the journal lock.
    pub fn read<T>(&self, f: impl FnOnce(&MaterializedState) -> T) -> T {
        f(&self.inner.lock().state)
    }

    /// Decide-and-append in one critical section.
    ///
    /// `f` inspects the current state and returns the events to append
    /// plus a result. No other writer can interleave between the
    /// decision and the write, which is what makes worker take and
    /// cancellation races linearizable.
    pub fn transact<T>(
        &self,
        f: impl FnOnce(&MaterializedState) -> (Vec<Event>, T),
    ) -> Result<T, JournalError> {
        let mut inner = self.inner.lock();
        let (events, result) = f(&inner.state);
        for event in &events {
            inner.wal.append(event)?;
        }
        inner.wal.flush()?;
        for event in &events {
            inner.state.apply_event(event);
        }
        Ok(result)
    }

    /// Write a checkpoint of the current state and truncate the WAL
    /// prefix it covers.
    pub fn checkpoint(&self) -> Result<(), JournalError> {
        let mut inner = self.inner.lock();
        let seq = inner.wal.write_seq();
        let cp = Checkpoint::new(seq, inner.state.clone());
        cp.write(&self.checkpoint_path)?;
        inner.wal.truncate_before(seq + 1)?;
        tracing::info!(seq, "checkpoint written");
        Ok(())
    }
}

#[cfg(test)]
#[path = "journal_tests.rs"]
mod tests;
