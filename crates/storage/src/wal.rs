// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! JSON-lines write-ahead journal with monotonic sequence numbers.
//!
//! One entry per line: `{"seq": N, "event": {...}}`. Appends are
//! buffered and flushed by the [`Journal`](crate::Journal) after each
//! write batch. A corrupt tail (partial write, binary garbage) is
//! detected on open: valid entries are preserved, the damaged file is
//! rotated to `.bak`, and a clean journal is rewritten.

use duet_core::Event;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from journal operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One journal line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: Event,
}

const MAX_BAK_FILES: u32 = 3;

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
pub fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

/// Append-only event journal.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    write_seq: u64,
    unflushed: usize,
}

impl Wal {
    /// Open (or create) the journal at `path`.
    ///
    /// Scans existing entries to recover the write sequence, never going
    /// below `floor_seq` (the sequence already covered by the latest
    /// checkpoint, so fresh appends after a truncation stay above it).
    /// If the file contains invalid lines, the valid prefix is
    /// preserved, the corrupt file is rotated to `.bak`, and a clean
    /// file is rewritten.
    pub fn open(path: impl Into<PathBuf>, floor_seq: u64) -> Result<Self, WalError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut write_seq = floor_seq;
        if path.exists() {
            let (entries, corrupt) = read_valid_prefix(&path)?;
            write_seq = entries.last().map(|e| e.seq).unwrap_or(0).max(floor_seq);

            if corrupt {
                let bak = rotate_bak_path(&path);
                tracing::warn!(
                    path = %path.display(),
                    bak = %bak.display(),
                    recovered = entries.len(),
                    "journal tail corrupt, rotating and rewriting valid prefix"
                );
                fs::rename(&path, &bak)?;
                let mut writer = BufWriter::new(File::create(&path)?);
                for entry in &entries {
                    serde_json::to_writer(&mut writer, entry)?;
                    writer.write_all(b"\n")?;
                }
                writer.flush()?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            writer: BufWriter::new(file),
            write_seq,
            unflushed: 0,
        })
    }

    /// Append an event, returning its sequence number. Buffered until
    /// [`flush`](Self::flush).
    pub fn append(&mut self, event: &Event) -> Result<u64, WalError> {
        self.write_seq += 1;
        let entry = WalEntry { seq: self.write_seq, event: event.clone() };
        serde_json::to_writer(&mut self.writer, &entry)?;
        self.writer.write_all(b"\n")?;
        self.unflushed += 1;
        Ok(self.write_seq)
    }

    /// Flush buffered entries to the OS and fsync.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.unflushed == 0 {
            return Ok(());
        }
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unflushed = 0;
        Ok(())
    }

    /// Highest sequence number written so far.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// All entries with `seq > after`, stopping at the first invalid line.
    pub fn entries_after(&self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        let (entries, _) = read_valid_prefix(&self.path)?;
        Ok(entries.into_iter().filter(|e| e.seq > after).collect())
    }

    /// Drop entries with `seq < before` by rewriting the file.
    ///
    /// Called after a checkpoint so the journal holds only the tail the
    /// checkpoint does not cover.
    pub fn truncate_before(&mut self, before: u64) -> Result<(), WalError> {
        self.flush()?;
        let (entries, _) = read_valid_prefix(&self.path)?;
        let keep: Vec<&WalEntry> = entries.iter().filter(|e| e.seq >= before).collect();

        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for entry in &keep {
                serde_json::to_writer(&mut writer, entry)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        fs::rename(&tmp, &self.path)?;

        let file = OpenOptions::new().append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

/// Read the longest valid entry prefix. Returns `(entries, corrupt)`
/// where `corrupt` is true if an invalid line cut the scan short.
fn read_valid_prefix(path: &Path) -> Result<(Vec<WalEntry>, bool), WalError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut corrupt = false;

    for line in reader.split(b'\n') {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let Ok(text) = std::str::from_utf8(&line) else {
            corrupt = true;
            break;
        };
        match serde_json::from_str::<WalEntry>(text) {
            Ok(entry) => entries.push(entry),
            Err(_) => {
                corrupt = true;
                break;
            }
        }
    }

    Ok((entries, corrupt))
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
