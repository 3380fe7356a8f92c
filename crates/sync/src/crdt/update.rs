// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Binary codec for CRDT updates.
//!
//! An update is a batch of operations:
//!
//! ```text
//! update  := magic(0xDC) version(0x01) varint(op_count) op*
//! op      := 0x00 op_id position char      -- insert
//!          | 0x01 op_id op_id              -- delete (second id = target)
//! op_id   := varint(replica) varint(counter)
//! position:= varint(depth) (varint(digit) varint(replica))*
//! char    := varint(scalar value)
//! ```
//!
//! Varints are LEB128. Decoding is structural only — well-formed bytes
//! with impossible semantics (zero counters, empty positions) decode
//! fine and are rejected at application time, which is what routes them
//! into conflict recovery instead of a plain validation error.

use super::position::{Entry, Position};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MAGIC: u8 = 0xDC;
const VERSION: u8 = 0x01;

const TAG_INSERT: u8 = 0x00;
const TAG_DELETE: u8 = 0x01;

/// Errors from decoding an update payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("empty update payload")]
    Empty,
    #[error("bad magic byte {0:#04x}")]
    BadMagic(u8),
    #[error("unsupported update version {0}")]
    Version(u8),
    #[error("truncated update payload")]
    Truncated,
    #[error("unknown op tag {0:#04x}")]
    UnknownTag(u8),
    #[error("invalid char scalar {0}")]
    BadChar(u32),
    #[error("update exceeds size limits")]
    TooLarge,
}

/// Identity of one operation: `(replica, counter)`. Counters start at 1
/// and increase per replica, which is what the state vector summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId {
    pub replica: u64,
    pub counter: u64,
}

/// One CRDT operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Insert { id: OpId, pos: Position, ch: char },
    Delete { id: OpId, target: OpId },
}

impl Op {
    pub fn id(&self) -> OpId {
        match self {
            Op::Insert { id, .. } | Op::Delete { id, .. } => *id,
        }
    }
}

/// A decoded batch of operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Update {
    pub ops: Vec<Op>,
}

impl Update {
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.ops.len() * 12);
        out.push(MAGIC);
        out.push(VERSION);
        write_varint(&mut out, self.ops.len() as u64);
        for op in &self.ops {
            match op {
                Op::Insert { id, pos, ch } => {
                    out.push(TAG_INSERT);
                    write_op_id(&mut out, id);
                    write_varint(&mut out, pos.entries().len() as u64);
                    for entry in pos.entries() {
                        write_varint(&mut out, entry.digit as u64);
                        write_varint(&mut out, entry.replica);
                    }
                    write_varint(&mut out, *ch as u64);
                }
                Op::Delete { id, target } => {
                    out.push(TAG_DELETE);
                    write_op_id(&mut out, id);
                    write_op_id(&mut out, target);
                }
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, UpdateError> {
        if bytes.is_empty() {
            return Err(UpdateError::Empty);
        }
        let mut reader = Reader { bytes, at: 0 };
        let magic = reader.byte()?;
        if magic != MAGIC {
            return Err(UpdateError::BadMagic(magic));
        }
        let version = reader.byte()?;
        if version != VERSION {
            return Err(UpdateError::Version(version));
        }
        let count = reader.varint()?;
        // A count the payload cannot possibly hold is corruption, not
        // an allocation request.
        if count > bytes.len() as u64 {
            return Err(UpdateError::Truncated);
        }

        let mut ops = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let tag = reader.byte()?;
            match tag {
                TAG_INSERT => {
                    let id = reader.op_id()?;
                    let depth = reader.varint()?;
                    if depth > bytes.len() as u64 {
                        return Err(UpdateError::Truncated);
                    }
                    let mut entries = Vec::with_capacity(depth as usize);
                    for _ in 0..depth {
                        let digit = reader.varint()?;
                        let replica = reader.varint()?;
                        let digit =
                            u32::try_from(digit).map_err(|_| UpdateError::TooLarge)?;
                        entries.push(Entry { digit, replica });
                    }
                    let scalar = reader.varint()?;
                    let scalar = u32::try_from(scalar).map_err(|_| UpdateError::TooLarge)?;
                    let ch = char::from_u32(scalar).ok_or(UpdateError::BadChar(scalar))?;
                    ops.push(Op::Insert { id, pos: Position::from_entries(entries), ch });
                }
                TAG_DELETE => {
                    let id = reader.op_id()?;
                    let target = reader.op_id()?;
                    ops.push(Op::Delete { id, target });
                }
                other => return Err(UpdateError::UnknownTag(other)),
            }
        }
        Ok(Self { ops })
    }
}

fn write_op_id(out: &mut Vec<u8>, id: &OpId) {
    write_varint(out, id.replica);
    write_varint(out, id.counter);
}

/// LEB128 unsigned varint.
pub(crate) fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub(crate) struct Reader<'a> {
    pub bytes: &'a [u8],
    pub at: usize,
}

impl Reader<'_> {
    pub fn byte(&mut self) -> Result<u8, UpdateError> {
        let b = *self.bytes.get(self.at).ok_or(UpdateError::Truncated)?;
        self.at += 1;
        Ok(b)
    }

    pub fn varint(&mut self) -> Result<u64, UpdateError> {
        let mut value: u64 = 0;
        let mut shift = 0;
        loop {
            let byte = self.byte()?;
            if shift >= 64 {
                return Err(UpdateError::TooLarge);
            }
            value |= ((byte & 0x7f) as u64) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    fn op_id(&mut self) -> Result<OpId, UpdateError> {
        let replica = self.varint()?;
        let counter = self.varint()?;
        Ok(OpId { replica, counter })
    }
}

#[cfg(test)]
#[path = "update_tests.rs"]
mod tests;
