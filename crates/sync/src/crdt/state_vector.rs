// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! State vectors: per-replica version summaries.
//!
//! `get(replica)` is the highest counter up to which this document has
//! applied *every* operation from that replica. Deltas against a state
//! vector carry exactly the operations above it.

use super::update::{write_varint, Reader, UpdateError};
use std::collections::BTreeMap;

/// Compact per-replica version summary.
///
/// ```text
/// state_vector := varint(len) (varint(replica) varint(counter))*
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateVector(BTreeMap<u64, u64>);

impl StateVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest contiguously applied counter for a replica (0 = none).
    pub fn get(&self, replica: u64) -> u64 {
        self.0.get(&replica).copied().unwrap_or(0)
    }

    pub fn set(&mut self, replica: u64, counter: u64) {
        if counter == 0 {
            self.0.remove(&replica);
        } else {
            self.0.insert(replica, counter);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.0.iter().map(|(&r, &c)| (r, c))
    }

    /// Whether every entry of `self` is covered by `other`.
    pub fn is_subset_of(&self, other: &StateVector) -> bool {
        self.iter().all(|(replica, counter)| other.get(replica) >= counter)
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.0.len() * 4);
        write_varint(&mut out, self.0.len() as u64);
        for (&replica, &counter) in &self.0 {
            write_varint(&mut out, replica);
            write_varint(&mut out, counter);
        }
        out
    }

    /// Decode a peer's state vector. An empty payload is a valid empty
    /// vector (a brand-new peer).
    pub fn decode(bytes: &[u8]) -> Result<Self, UpdateError> {
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        let mut reader = Reader { bytes, at: 0 };
        let len = reader.varint()?;
        if len > bytes.len() as u64 {
            return Err(UpdateError::Truncated);
        }
        let mut map = BTreeMap::new();
        for _ in 0..len {
            let replica = reader.varint()?;
            let counter = reader.varint()?;
            if counter > 0 {
                map.insert(replica, counter);
            }
        }
        Ok(Self(map))
    }
}

#[cfg(test)]
#[path = "state_vector_tests.rs"]
mod tests;
