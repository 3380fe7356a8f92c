// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Character positions.
//!
//! A position is a path of `(digit, replica)` entries compared
//! lexicographically, with a shorter path ordering before any longer
//! path it prefixes. Allocation between two neighbors always finds room
//! by descending a level when the digit gap closes, and the replica id
//! in each entry breaks ties between concurrent allocations of the same
//! digit — two replicas can insert "between the same characters" and
//! every copy of the document orders them identically.

use serde::{Deserialize, Serialize};

/// Gap left after the previous entry when the right side is
/// unconstrained. Small enough to keep paths shallow for appends.
const BOUNDARY: u32 = 16;

/// One level of a position path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Entry {
    pub digit: u32,
    pub replica: u64,
}

/// Totally ordered position of one character.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position(Vec<Entry>);

impl Position {
    pub fn entries(&self) -> &[Entry] {
        &self.0
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self(entries)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Allocate a position strictly between `left` and `right` for
    /// `replica`. `None` bounds mean the document edge. Deterministic:
    /// the same inputs always allocate the same path.
    pub fn between(left: Option<&Position>, right: Option<&Position>, replica: u64) -> Self {
        let empty: &[Entry] = &[];
        let left_entries = left.map(|p| p.entries()).unwrap_or(empty);
        let right_entries = right.map(|p| p.entries()).unwrap_or(empty);

        let mut path: Vec<Entry> = Vec::new();
        let mut level = 0;
        loop {
            let l = left_entries.get(level).copied();
            let r = right_entries.get(level).copied();

            // Identical entry on both sides: descend along it.
            if let (Some(le), Some(re)) = (l, r) {
                if le == re {
                    path.push(le);
                    level += 1;
                    continue;
                }
            }

            let low = l.map(|e| e.digit).unwrap_or(0);
            let high = r.map(|e| e.digit).unwrap_or(u32::MAX);
            if high - low > 1 {
                // Room at this level: take the midpoint (bounded step
                // when the right side is open-ended).
                let digit = if r.is_some() {
                    low + (high - low) / 2
                } else {
                    low.saturating_add(BOUNDARY).min(high - 1)
                };
                path.push(Entry { digit, replica });
                return Self(path);
            }

            // No room at this level. Branch under the left entry if
            // there is one: it orders strictly below `right` here (first
            // differing level), so only `left` constrains deeper levels.
            if let Some(le) = l {
                path.push(le);
                return Self(extend_above(path, left_entries, level + 1, replica));
            }

            // Left is exhausted. A floor entry orders below any real
            // entry; if right's entry IS the floor, descend along it.
            let floor = Entry { digit: 0, replica: 0 };
            match r {
                Some(re) if floor < re => {
                    path.push(floor);
                    return Self(extend_above(path, empty, level + 1, replica));
                }
                Some(re) => {
                    path.push(re);
                    level += 1;
                }
                // Unreachable: l and r both exhausted means low 0 and
                // high MAX, handled by the gap branch above.
                None => {
                    path.push(Entry { digit: BOUNDARY, replica });
                    return Self(path);
                }
            }
        }
    }
}

/// Finish a path that only `left` constrains from `level` down.
fn extend_above(mut path: Vec<Entry>, left: &[Entry], mut level: usize, replica: u64) -> Vec<Entry> {
    loop {
        match left.get(level).copied() {
            Some(le) if le.digit == u32::MAX => {
                // Saturated level: copy it and keep descending.
                path.push(le);
                level += 1;
            }
            Some(le) => {
                path.push(Entry {
                    digit: le.digit.saturating_add(BOUNDARY).min(u32::MAX - 1).max(le.digit + 1),
                    replica,
                });
                return path;
            }
            None => {
                path.push(Entry { digit: BOUNDARY, replica });
                return path;
            }
        }
    }
}

#[cfg(test)]
#[path = "position_tests.rs"]
mod tests;
