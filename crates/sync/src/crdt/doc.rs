// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! The collaborative document.
//!
//! A document is a totally ordered set of character items (tombstones
//! included) plus a per-replica operation log. Applying an update is
//! idempotent: operations at or below the state vector are skipped,
//! operations above the next expected counter park in a pending buffer
//! until their gap closes, and a delete arriving before its insert
//! tombstones the id so the insert lands already-deleted.

use super::position::Position;
use super::state_vector::StateVector;
use super::update::{Op, OpId, Update, UpdateError};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

/// Semantic rejection of a decoded operation. Routes the update into
/// conflict recovery rather than plain input validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApplyError {
    #[error("operation {0:?} has a zero counter")]
    ZeroCounter(OpId),
    #[error("insert {0:?} has an empty position path")]
    EmptyPosition(OpId),
    #[error("position of {0:?} is occupied by a different operation")]
    PositionConflict(OpId),
}

#[derive(Debug, Clone)]
struct Item {
    id: OpId,
    ch: char,
    deleted: bool,
}

/// One replica's copy of the shared text.
#[derive(Debug, Clone, Default)]
pub struct Doc {
    replica: u64,
    /// Highest counter this replica has allocated for local edits.
    counter: u64,
    items: BTreeMap<Position, Item>,
    by_id: HashMap<OpId, Position>,
    /// Per-replica applied ops, contiguous from counter 1.
    oplog: BTreeMap<u64, Vec<Op>>,
    /// Targets of applied deletes, including not-yet-seen inserts.
    tombstoned: HashSet<OpId>,
    /// Ops waiting for a counter gap to close.
    pending: Vec<Op>,
}

impl Doc {
    /// Replica ids must be nonzero (zero is reserved for position floor
    /// entries); zero is coerced to one.
    pub fn new(replica: u64) -> Self {
        Self { replica: replica.max(1), ..Self::default() }
    }

    /// A document seeded with `text` as local edits.
    pub fn with_text(replica: u64, text: &str) -> Self {
        let mut doc = Self::new(replica);
        let _ = doc.insert(0, text);
        doc
    }

    pub fn replica(&self) -> u64 {
        self.replica
    }

    /// The shared text ("code" field) — visible characters in order.
    pub fn text(&self) -> String {
        self.items.values().filter(|i| !i.deleted).map(|i| i.ch).collect()
    }

    pub fn len(&self) -> usize {
        self.items.values().filter(|i| !i.deleted).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Highest contiguously applied counter per replica.
    pub fn state_vector(&self) -> StateVector {
        let mut sv = StateVector::new();
        for (&replica, ops) in &self.oplog {
            sv.set(replica, ops.len() as u64);
        }
        sv
    }

    fn applied(&self, id: &OpId) -> bool {
        self.oplog.get(&id.replica).map(|ops| ops.len() as u64 >= id.counter).unwrap_or(false)
    }

    /// Insert `text` at a visible character offset, producing the
    /// update to broadcast. Offsets beyond the end append.
    pub fn insert(&mut self, offset: usize, text: &str) -> Update {
        let mut ops = Vec::with_capacity(text.chars().count());
        let mut left = self.visible_position(offset.checked_sub(1));
        let right = self.visible_position(Some(offset));

        for ch in text.chars() {
            self.counter += 1;
            let id = OpId { replica: self.replica, counter: self.counter };
            let pos = Position::between(left.as_ref(), right.as_ref(), self.replica);
            let op = Op::Insert { id, pos: pos.clone(), ch };
            self.integrate(op.clone());
            ops.push(op);
            left = Some(pos);
        }
        Update { ops }
    }

    /// Delete `len` visible characters starting at `offset`, producing
    /// the update to broadcast.
    pub fn delete(&mut self, offset: usize, len: usize) -> Update {
        let targets: Vec<OpId> = self
            .items
            .values()
            .filter(|i| !i.deleted)
            .skip(offset)
            .take(len)
            .map(|i| i.id)
            .collect();

        let mut ops = Vec::with_capacity(targets.len());
        for target in targets {
            self.counter += 1;
            let id = OpId { replica: self.replica, counter: self.counter };
            let op = Op::Delete { id, target };
            self.integrate(op.clone());
            ops.push(op);
        }
        Update { ops }
    }

    /// Position of the nth visible character (None = document edge).
    fn visible_position(&self, offset: Option<usize>) -> Option<Position> {
        let offset = offset?;
        self.items
            .iter()
            .filter(|(_, i)| !i.deleted)
            .nth(offset)
            .map(|(pos, _)| pos.clone())
    }

    /// Apply a decoded update.
    ///
    /// All operations are checked before any mutation, so a rejected
    /// update leaves the document untouched and recovery can encode the
    /// current state as known-good. Applying the same update again is a
    /// no-op.
    pub fn apply(&mut self, update: &Update) -> Result<(), ApplyError> {
        for op in &update.ops {
            let id = op.id();
            if id.counter == 0 {
                return Err(ApplyError::ZeroCounter(id));
            }
            if let Op::Insert { pos, .. } = op {
                if pos.is_empty() {
                    return Err(ApplyError::EmptyPosition(id));
                }
                if let Some(existing) = self.items.get(pos) {
                    if existing.id != id {
                        return Err(ApplyError::PositionConflict(id));
                    }
                }
            }
        }

        for op in &update.ops {
            self.enqueue(op.clone());
        }
        self.drain_pending();
        Ok(())
    }

    /// Decode and apply raw update bytes.
    pub fn apply_bytes(&mut self, bytes: &[u8]) -> Result<Result<(), ApplyError>, UpdateError> {
        let update = Update::decode(bytes)?;
        Ok(self.apply(&update))
    }

    fn enqueue(&mut self, op: Op) {
        let id = op.id();
        if self.applied(&id) {
            return;
        }
        let next = self.oplog.get(&id.replica).map(|ops| ops.len() as u64 + 1).unwrap_or(1);
        if id.counter == next {
            self.integrate(op);
        } else if !self.pending.iter().any(|p| p.id() == id) {
            self.pending.push(op);
        }
    }

    /// Retry parked ops until no more become applicable.
    fn drain_pending(&mut self) {
        loop {
            let mut progressed = false;
            let mut still_pending = Vec::with_capacity(self.pending.len());
            for op in std::mem::take(&mut self.pending) {
                let id = op.id();
                if self.applied(&id) {
                    progressed = true;
                    continue;
                }
                let next =
                    self.oplog.get(&id.replica).map(|ops| ops.len() as u64 + 1).unwrap_or(1);
                if id.counter == next {
                    self.integrate(op);
                    progressed = true;
                } else {
                    still_pending.push(op);
                }
            }
            self.pending = still_pending;
            if !progressed || self.pending.is_empty() {
                return;
            }
        }
    }

    /// Integrate an op whose counter is next for its replica.
    fn integrate(&mut self, op: Op) {
        let id = op.id();
        match &op {
            Op::Insert { pos, ch, .. } => {
                let deleted = self.tombstoned.contains(&id);
                self.items.insert(pos.clone(), Item { id, ch: *ch, deleted });
                self.by_id.insert(id, pos.clone());
            }
            Op::Delete { target, .. } => {
                self.tombstoned.insert(*target);
                if let Some(pos) = self.by_id.get(target) {
                    if let Some(item) = self.items.get_mut(pos) {
                        item.deleted = true;
                    }
                }
            }
        }
        self.oplog.entry(id.replica).or_default().push(op);
        if id.replica == self.replica {
            self.counter = self.counter.max(id.counter);
        }
    }

    /// Encode the minimal delta a peer with `remote` needs.
    pub fn encode_state_as_update(&self, remote: &StateVector) -> Vec<u8> {
        let mut ops = Vec::new();
        for (&replica, log) in &self.oplog {
            let have = remote.get(replica) as usize;
            if have < log.len() {
                ops.extend_from_slice(&log[have..]);
            }
        }
        Update { ops }.encode()
    }

    /// Full document state: the delta against an empty peer.
    pub fn encode_full_state(&self) -> Vec<u8> {
        self.encode_state_as_update(&StateVector::new())
    }

    /// Rebuild a document from a full-state (or any) update payload.
    pub fn from_state(replica: u64, bytes: &[u8]) -> Result<Self, DocDecodeError> {
        let mut doc = Self::new(replica);
        match doc.apply_bytes(bytes) {
            Ok(Ok(())) => Ok(doc),
            Ok(Err(apply)) => Err(DocDecodeError::Apply(apply)),
            Err(decode) => Err(DocDecodeError::Decode(decode)),
        }
    }

    /// Encode-decode-compare integrity check.
    pub fn integrity_ok(&self) -> bool {
        match Doc::from_state(self.replica, &self.encode_full_state()) {
            Ok(copy) => copy.text() == self.text(),
            Err(_) => false,
        }
    }
}

/// Failure to rebuild a document from persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocDecodeError {
    #[error(transparent)]
    Decode(#[from] UpdateError),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}

#[cfg(test)]
#[path = "doc_tests.rs"]
mod tests;
