// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

use super::*;
use duet_core::{Event, JobId, JobState, RoomId};
use tempfile::tempdir;

fn room_created(n: u32) -> Event {
    Event::RoomCreated {
        id: RoomId::from_string(format!("rm-{n}")),
        join_key: "AAAABBBBCCCC".into(),
        created_at_ms: n as u64,
    }
}

#[test]
fn append_is_immediately_visible() {
    let dir = tempdir().unwrap();
    let journal = Journal::open(dir.path()).unwrap();

    journal.append(&[room_created(1)]).unwrap();

    assert_eq!(journal.read(|s| s.rooms.len()), 1);
}

#[test]
fn state_survives_reopen() {
    let dir = tempdir().unwrap();
    {
        let journal = Journal::open(dir.path()).unwrap();
        journal.append(&[room_created(1), room_created(2)]).unwrap();
    }

    let journal = Journal::open(dir.path()).unwrap();
    assert_eq!(journal.read(|s| s.rooms.len()), 2);
}

#[test]
fn checkpoint_then_more_events_then_reopen() {
    let dir = tempdir().unwrap();
    {
        let journal = Journal::open(dir.path()).unwrap();
        journal.append(&[room_created(1)]).unwrap();
        journal.checkpoint().unwrap();
        journal.append(&[room_created(2)]).unwrap();
    }

    // Recovery = checkpoint (room 1) + journal tail (room 2)
    let journal = Journal::open(dir.path()).unwrap();
    assert_eq!(journal.read(|s| s.rooms.len()), 2);
}

#[test]
fn checkpoint_after_reopen_does_not_lose_tail() {
    let dir = tempdir().unwrap();
    {
        let journal = Journal::open(dir.path()).unwrap();
        journal.append(&[room_created(1)]).unwrap();
        journal.checkpoint().unwrap();
    }
    {
        // New appends after reopen must land above the checkpoint seq
        let journal = Journal::open(dir.path()).unwrap();
        journal.append(&[room_created(2)]).unwrap();
    }

    let journal = Journal::open(dir.path()).unwrap();
    assert_eq!(journal.read(|s| s.rooms.len()), 2);
}

#[test]
fn transact_decides_and_writes_atomically() {
    let dir = tempdir().unwrap();
    let journal = Journal::open(dir.path()).unwrap();

    journal
        .append(&[Event::JobCreated {
            id: JobId::from_string("job-1"),
            room_id: RoomId::from_string("rm-1"),
            user_id: "alice".into(),
            code: String::new(),
            options: duet_core::ExecOptions::default(),
            created_at_ms: 1,
        }])
        .unwrap();

    // Cancel only if the job is still non-terminal, observing the
    // decision and the write as one step.
    let cancelled = journal
        .transact(|s| {
            let id = JobId::from_string("job-1");
            if s.jobs.get(&id).map(|j| !j.is_terminal()).unwrap_or(false) {
                (vec![Event::JobCancelled { id, at_ms: 2 }], true)
            } else {
                (vec![], false)
            }
        })
        .unwrap();
    assert!(cancelled);
    assert_eq!(
        journal.read(|s| s.jobs[&JobId::from_string("job-1")].state),
        JobState::Cancelled
    );

    // Second attempt observes the terminal state and declines
    let cancelled_again = journal
        .transact(|s| {
            let id = JobId::from_string("job-1");
            if s.jobs.get(&id).map(|j| !j.is_terminal()).unwrap_or(false) {
                (vec![Event::JobCancelled { id, at_ms: 3 }], true)
            } else {
                (vec![], false)
            }
        })
        .unwrap();
    assert!(!cancelled_again);
}
