// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

use super::*;
use duet_core::{Event, RoomId};
use tempfile::tempdir;

fn sample_state() -> MaterializedState {
    let mut state = MaterializedState::default();
    state.apply_event(&Event::RoomCreated {
        id: RoomId::from_string("rm-1"),
        join_key: "AAAABBBBCCCC".into(),
        created_at_ms: 1,
    });
    state
}

#[test]
fn write_then_load_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checkpoint.json.zst");

    Checkpoint::new(7, sample_state()).write(&path).unwrap();

    let loaded = load_checkpoint(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 7);
    assert_eq!(loaded.version, CURRENT_CHECKPOINT_VERSION);
    assert!(loaded.state.rooms.contains_key(&RoomId::from_string("rm-1")));
}

#[test]
fn missing_checkpoint_loads_none() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checkpoint.json.zst");
    assert!(load_checkpoint(&path).unwrap().is_none());
}

#[test]
fn corrupt_checkpoint_is_rotated_to_bak() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checkpoint.json.zst");
    std::fs::write(&path, b"definitely not zstd").unwrap();

    assert!(load_checkpoint(&path).unwrap().is_none());
    assert!(path.with_extension("bak").exists());
    assert!(!path.exists());
}

#[test]
fn overwrite_replaces_previous_checkpoint() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checkpoint.json.zst");

    Checkpoint::new(1, MaterializedState::default()).write(&path).unwrap();
    Checkpoint::new(2, sample_state()).write(&path).unwrap();

    let loaded = load_checkpoint(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 2);
    assert_eq!(loaded.state.rooms.len(), 1);
}
