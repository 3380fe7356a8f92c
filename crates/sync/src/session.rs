// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! CRDT session manager: owns per-room documents.
//!
//! Each room gets one [`RoomSession`]: the canonical document behind a
//! mutex (the per-room apply lane), a broadcast channel for fan-out, a
//! periodic snapshot task, and counters driving the snapshot policy.
//! Updates are applied to the server document first — that apply order
//! is the room's total order — then re-broadcast to the other
//! connections in the same order. Cross-room operations never contend.

use crate::crdt::{Doc, StateVector, UpdateError};
use duet_core::{Clock, RoomId, SnapshotKind};
use duet_storage::{RoomStore, SnapshotStore, StoreError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;

/// Applied updates per room before an automatic snapshot.
const SNAPSHOT_OP_THRESHOLD: u32 = 100;

/// Encoded-state size above which integrity checks warn.
const STATE_SIZE_WARN_BYTES: usize = 1024 * 1024;

/// Content-length divergence from the latest snapshot that draws a
/// warning during integrity checks.
const SNAPSHOT_DIVERGENCE_WARN: usize = 10_000;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid update: {0}")]
    InvalidUpdate(#[from] UpdateError),
    #[error("room document not initialized")]
    NotInitialized,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("conflict resolution failed: {0}")]
    ConflictResolutionFailed(String),
}

/// Fan-out messages on a room's broadcast channel.
///
/// `origin` carries the connection id the update came from so the
/// sender's own connection can skip it.
#[derive(Debug, Clone)]
pub enum RoomMessage {
    Update { bytes: Vec<u8>, origin: Option<String> },
    ConflictResolved { state: Vec<u8> },
}

/// Outcome of applying a client update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedUpdate {
    /// Applied cleanly; the update was re-broadcast.
    Applied,
    /// Apply failed but scratch-replay recovery produced a merged
    /// document; the carried state goes back to the sender.
    ConflictResolved(Vec<u8>),
}

/// Result of a document integrity check.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl IntegrityReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Tunables, defaulted per the service contract.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Periodic auto-snapshot interval.
    pub snapshot_interval: Duration,
    /// Minimum spacing of `Room.crdt_state` persists.
    pub persist_debounce: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            snapshot_interval: Duration::from_secs(30),
            persist_debounce: Duration::from_secs(1),
        }
    }
}

struct DocState {
    doc: Doc,
    /// Updates applied since the last op-threshold snapshot.
    ops_since_snapshot: u32,
    /// Last debounced `Room.crdt_state` persist.
    last_persist_ms: u64,
}

/// One room's live document and fan-out channel.
pub struct RoomSession {
    room_id: RoomId,
    state: Mutex<DocState>,
    broadcast: broadcast::Sender<RoomMessage>,
    snapshot_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl RoomSession {
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RoomMessage> {
        self.broadcast.subscribe()
    }
}

/// In-memory registry of per-room CRDT documents.
pub struct SyncSessions<C: Clock> {
    rooms: Mutex<HashMap<RoomId, Arc<RoomSession>>>,
    room_store: RoomStore<C>,
    snapshot_store: SnapshotStore<C>,
    clock: C,
    config: SessionConfig,
}

impl<C: Clock + 'static> SyncSessions<C> {
    pub fn new(
        room_store: RoomStore<C>,
        snapshot_store: SnapshotStore<C>,
        clock: C,
        config: SessionConfig,
    ) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            room_store,
            snapshot_store,
            clock,
            config,
        }
    }

    /// Stable server replica id for a room's canonical document.
    fn replica_for(room_id: &RoomId) -> u64 {
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for b in room_id.as_str().bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash.max(1)
    }

    /// Get or construct the room's document.
    ///
    /// Restoration order: the room row's persisted `crdt_state`; failing
    /// integrity, the latest snapshot's `crdt_state`; failing that, the
    /// snapshot or room `code_snapshot` text; else empty. Also installs
    /// the periodic snapshot task.
    pub fn initialize_document(
        self: &Arc<Self>,
        room_id: &RoomId,
    ) -> Result<Arc<RoomSession>, SyncError> {
        if let Some(session) = self.rooms.lock().get(room_id) {
            return Ok(session.clone());
        }

        let room = self.room_store.find_by_id(room_id).ok_or(StoreError::RoomNotFound)?;
        let replica = Self::replica_for(room_id);

        let doc = restore_document(replica, &room, &self.snapshot_store);

        let (broadcast_tx, _) = broadcast::channel(512);
        let session = Arc::new(RoomSession {
            room_id: *room_id,
            state: Mutex::new(DocState {
                doc,
                ops_since_snapshot: 0,
                last_persist_ms: 0,
            }),
            broadcast: broadcast_tx,
            snapshot_task: Mutex::new(None),
        });

        // Periodic auto-snapshot while the document lives in memory.
        let task = {
            let sessions = Arc::downgrade(self);
            let room_id = *room_id;
            let interval = self.config.snapshot_interval;
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let Some(sessions) = sessions.upgrade() else { return };
                    if let Err(e) = sessions.periodic_snapshot(&room_id) {
                        tracing::warn!(room_id = %room_id, error = %e, "periodic snapshot failed");
                    }
                }
            })
        };
        *session.snapshot_task.lock() = Some(task);

        let mut rooms = self.rooms.lock();
        // Two initializers can race up to here; the first insert wins
        // and the loser's session (and timer) is dropped.
        let entry = rooms.entry(*room_id).or_insert_with(|| session.clone());
        if !Arc::ptr_eq(entry, &session) {
            if let Some(task) = session.snapshot_task.lock().take() {
                task.abort();
            }
        }
        Ok(entry.clone())
    }

    fn session(&self, room_id: &RoomId) -> Result<Arc<RoomSession>, SyncError> {
        self.rooms.lock().get(room_id).cloned().ok_or(SyncError::NotInitialized)
    }

    /// Current `"code"` text of the room document.
    pub fn document_content(&self, room_id: &RoomId) -> Result<String, SyncError> {
        Ok(self.session(room_id)?.state.lock().doc.text())
    }

    /// Current state vector plus full state, for `crdt-sync-request`.
    pub fn sync_state(&self, room_id: &RoomId) -> Result<(Vec<u8>, Vec<u8>), SyncError> {
        let session = self.session(room_id)?;
        let state = session.state.lock();
        Ok((state.doc.state_vector().encode(), state.doc.encode_full_state()))
    }

    /// Delta against a peer's state vector, for `crdt-sync-step1`.
    pub fn sync_delta(&self, room_id: &RoomId, state_vector: &[u8]) -> Result<Vec<u8>, SyncError> {
        let sv = StateVector::decode(state_vector)?;
        let session = self.session(room_id)?;
        let state = session.state.lock();
        Ok(state.doc.encode_state_as_update(&sv))
    }

    /// Apply a client update to the canonical document, then fan out.
    ///
    /// The apply lane (the document mutex) serializes updates within the
    /// room and fixes the broadcast order. Application errors route into
    /// conflict resolution.
    pub fn apply_client_update(
        &self,
        room_id: &RoomId,
        bytes: &[u8],
        origin: Option<&str>,
    ) -> Result<AppliedUpdate, SyncError> {
        if bytes.is_empty() {
            return Err(SyncError::InvalidUpdate(UpdateError::Empty));
        }
        let update = crate::crdt::Update::decode(bytes)?;
        if update.is_empty() {
            return Err(SyncError::InvalidUpdate(UpdateError::Empty));
        }

        let session = self.session(room_id)?;
        let mut state = session.state.lock();

        if let Err(apply_err) = state.doc.apply(&update) {
            tracing::warn!(room_id = %room_id, error = %apply_err, "update rejected, starting conflict resolution");
            drop(state);
            let merged = self.resolve_conflict(room_id, bytes)?;
            return Ok(AppliedUpdate::ConflictResolved(merged));
        }

        state.ops_since_snapshot += 1;
        let content = state.doc.text();
        let encoded = state.doc.encode_full_state();

        // Broadcast under the lane lock so fan-out order matches apply
        // order.
        let _ = session.broadcast.send(RoomMessage::Update {
            bytes: bytes.to_vec(),
            origin: origin.map(|s| s.to_string()),
        });

        let now = self.clock.epoch_ms();
        let snapshot_due = state.ops_since_snapshot >= SNAPSHOT_OP_THRESHOLD;
        if snapshot_due {
            state.ops_since_snapshot = 0;
        }
        let persist_due = now.saturating_sub(state.last_persist_ms)
            >= self.config.persist_debounce.as_millis() as u64;
        if persist_due {
            state.last_persist_ms = now;
        }
        drop(state);

        if snapshot_due {
            self.create_snapshot(room_id, SnapshotKind::Auto)?;
        }
        if persist_due {
            // Throttled "latest state" copy onto the room row.
            self.room_store.update_snapshot(room_id, &content, Some(encoded))?;
        }

        Ok(AppliedUpdate::Applied)
    }

    /// Write a snapshot of the current document state.
    pub fn create_snapshot(&self, room_id: &RoomId, kind: SnapshotKind) -> Result<(), SyncError> {
        let session = self.session(room_id)?;
        let (content, encoded) = {
            let state = session.state.lock();
            (state.doc.text(), state.doc.encode_full_state())
        };
        self.snapshot_store.create(room_id, &content, Some(encoded), kind)?;
        tracing::debug!(room_id = %room_id, kind = %kind, "snapshot created");
        Ok(())
    }

    fn periodic_snapshot(&self, room_id: &RoomId) -> Result<(), SyncError> {
        let session = self.session(room_id)?;
        let empty = session.state.lock().doc.is_empty();
        if !empty {
            self.create_snapshot(room_id, SnapshotKind::Auto)?;
        }
        Ok(())
    }

    /// Encode, decode into a fresh document, and compare text; collect
    /// soft warnings (oversized state, large divergence from the latest
    /// snapshot).
    pub fn validate_integrity(&self, room_id: &RoomId) -> Result<IntegrityReport, SyncError> {
        let session = self.session(room_id)?;
        let (ok, content, encoded_len) = {
            let state = session.state.lock();
            (state.doc.integrity_ok(), state.doc.text(), state.doc.encode_full_state().len())
        };

        let mut report = IntegrityReport::default();
        if !ok {
            report.errors.push("encoded state does not round-trip to identical text".into());
        }
        if encoded_len > STATE_SIZE_WARN_BYTES {
            report.warnings.push(format!("encoded state is {encoded_len} bytes"));
        }
        if let Some(snapshot) = self.snapshot_store.latest(room_id) {
            let divergence = content.len().abs_diff(snapshot.content.len());
            if divergence > SNAPSHOT_DIVERGENCE_WARN {
                report
                    .warnings
                    .push(format!("content diverges {divergence} bytes from latest snapshot"));
            }
        }
        Ok(report)
    }

    /// Conflict recovery for an update the canonical document rejected.
    ///
    /// 1. Back up the current known-good state.
    /// 2. Replay (current state, then the failing update) into a scratch
    ///    document; on success the scratch becomes canonical and the
    ///    merged state is persisted and broadcast.
    /// 3. Otherwise restore from the latest snapshot and report failure.
    pub fn resolve_conflict(&self, room_id: &RoomId, bytes: &[u8]) -> Result<Vec<u8>, SyncError> {
        let session = self.session(room_id)?;

        self.create_snapshot(room_id, SnapshotKind::Backup)?;

        let replica = Self::replica_for(room_id);
        let current = session.state.lock().doc.encode_full_state();

        let mut scratch = Doc::new(replica);
        let replayed = scratch
            .apply_bytes(&current)
            .ok()
            .map(|r| r.is_ok())
            .unwrap_or(false)
            && scratch
                .apply_bytes(bytes)
                .ok()
                .map(|r| r.is_ok())
                .unwrap_or(false);

        if replayed {
            let merged = scratch.encode_full_state();
            let content = scratch.text();
            {
                let mut state = session.state.lock();
                state.doc = scratch;
                let _ = session.broadcast.send(RoomMessage::ConflictResolved {
                    state: merged.clone(),
                });
            }
            self.room_store.update_snapshot(room_id, &content, Some(merged.clone()))?;
            tracing::info!(room_id = %room_id, "conflict resolved via scratch replay");
            return Ok(merged);
        }

        // Scratch replay failed too: fall back to the latest snapshot.
        let restored = self
            .snapshot_store
            .latest(room_id)
            .and_then(|snapshot| {
                snapshot
                    .crdt_state
                    .as_deref()
                    .and_then(|bytes| Doc::from_state(replica, bytes).ok())
                    .or_else(|| Some(Doc::with_text(replica, &snapshot.content)))
            });

        match restored {
            Some(doc) => {
                session.state.lock().doc = doc;
                tracing::warn!(room_id = %room_id, "conflict resolution restored from snapshot");
                Err(SyncError::ConflictResolutionFailed(
                    "update could not be merged; document restored from snapshot".into(),
                ))
            }
            None => Err(SyncError::ConflictResolutionFailed(
                "update could not be merged and no snapshot exists".into(),
            )),
        }
    }

    /// Cancel timers, destroy the document, remove from the registry.
    /// Persists a final state copy first.
    pub fn cleanup_room(&self, room_id: &RoomId) -> Result<(), SyncError> {
        let Some(session) = self.rooms.lock().remove(room_id) else {
            return Ok(());
        };
        if let Some(task) = session.snapshot_task.lock().take() {
            task.abort();
        }
        let (content, encoded) = {
            let state = session.state.lock();
            (state.doc.text(), state.doc.encode_full_state())
        };
        // Archived rooms reject the final write; that is fine.
        match self.room_store.update_snapshot(room_id, &content, Some(encoded)) {
            Ok(()) | Err(StoreError::Archived) | Err(StoreError::RoomNotFound) => {}
            Err(e) => return Err(e.into()),
        }
        tracing::debug!(room_id = %room_id, "room session cleaned up");
        Ok(())
    }

    /// Rooms with live in-memory documents.
    pub fn active_rooms(&self) -> Vec<RoomId> {
        self.rooms.lock().keys().copied().collect()
    }
}

/// Restoration ladder for a room document.
fn restore_document<C: Clock>(
    replica: u64,
    room: &duet_core::Room,
    snapshots: &SnapshotStore<C>,
) -> Doc {
    // (a) the room row's persisted CRDT state
    if !room.crdt_state.is_empty() {
        if let Ok(doc) = Doc::from_state(replica, &room.crdt_state) {
            if doc.integrity_ok() {
                return doc;
            }
            tracing::warn!(room_id = %room.id, "room crdt_state failed integrity, trying snapshot");
        } else {
            tracing::warn!(room_id = %room.id, "room crdt_state undecodable, trying snapshot");
        }
    }

    // (b) the latest snapshot's CRDT state
    if let Some(snapshot) = snapshots.latest(&room.id) {
        if let Some(bytes) = snapshot.crdt_state.as_deref() {
            if let Ok(doc) = Doc::from_state(replica, bytes) {
                if doc.integrity_ok() {
                    return doc;
                }
            }
        }
        // (c) seed from the snapshot text
        if !snapshot.content.is_empty() {
            return Doc::with_text(replica, &snapshot.content);
        }
    }

    // (c') seed from the room's plain-text snapshot, else empty
    if !room.code_snapshot.is_empty() {
        Doc::with_text(replica, &room.code_snapshot)
    } else {
        Doc::new(replica)
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
