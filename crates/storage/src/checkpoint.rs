// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Checkpoint persistence for crash recovery.
//!
//! Checkpoints store the complete materialized state at a point in time,
//! identified by the journal sequence number. Recovery loads the
//! checkpoint and replays journal entries after that sequence. Files are
//! zstd-compressed JSON, written to a temp path and renamed so a crash
//! mid-write never clobbers the last good checkpoint.

use crate::state::MaterializedState;
use crate::wal::rotate_bak_path;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use thiserror::Error;

/// Current checkpoint schema version
pub const CURRENT_CHECKPOINT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

/// Errors that can occur in checkpoint operations
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported checkpoint version {0}")]
    Version(u32),
}

/// A checkpoint of the materialized state at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    /// Journal sequence number at the time of checkpoint
    pub seq: u64,
    /// The complete materialized state
    pub state: MaterializedState,
    /// When this checkpoint was created
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(seq: u64, state: MaterializedState) -> Self {
        Self {
            version: CURRENT_CHECKPOINT_VERSION,
            seq,
            state,
            created_at: Utc::now(),
        }
    }

    /// Write atomically: temp file, fsync, rename.
    pub fn write(&self, path: &Path) -> Result<(), CheckpointError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("tmp");
        {
            let file = File::create(&tmp)?;
            let mut encoder = zstd::stream::Encoder::new(BufWriter::new(file), ZSTD_LEVEL)?;
            serde_json::to_writer(&mut encoder, self)?;
            let writer = encoder.finish()?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_data()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Load the checkpoint at `path`, if present and readable.
///
/// A corrupt checkpoint is rotated to `.bak` and `None` is returned, so
/// recovery falls back to full journal replay.
pub fn load_checkpoint(path: &Path) -> Result<Option<Checkpoint>, CheckpointError> {
    if !path.exists() {
        return Ok(None);
    }
    let file = File::open(path)?;
    let decoded: Result<Checkpoint, _> = zstd::stream::Decoder::new(BufReader::new(file))
        .map_err(CheckpointError::Io)
        .and_then(|d| serde_json::from_reader(d).map_err(CheckpointError::Json));

    match decoded {
        Ok(cp) if cp.version == CURRENT_CHECKPOINT_VERSION => Ok(Some(cp)),
        Ok(cp) => Err(CheckpointError::Version(cp.version)),
        Err(err) => {
            let bak = rotate_bak_path(path);
            tracing::warn!(
                path = %path.display(),
                bak = %bak.display(),
                error = %err,
                "checkpoint unreadable, rotating and replaying full journal"
            );
            fs::rename(path, &bak)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
#[path = "checkpoint_tests.rs"]
mod tests;
