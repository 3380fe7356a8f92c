// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Collaboration flow: create → join → type → snapshot → restore.

use duet_core::{FakeClock, JoinKey, SnapshotKind};
use duet_storage::{Journal, RoomStore, SnapshotStore};
use duet_sync::{AppliedUpdate, Doc, PresenceTracker, RoomMessage, SessionConfig, SyncSessions};
use std::sync::Arc;

struct Env {
    _dir: tempfile::TempDir,
    rooms: RoomStore<FakeClock>,
    snapshots: SnapshotStore<FakeClock>,
    sessions: Arc<SyncSessions<FakeClock>>,
    presence: PresenceTracker<FakeClock>,
}

fn build() -> Env {
    let dir = tempfile::tempdir().unwrap();
    let journal = Journal::open(dir.path()).unwrap();
    let clock = FakeClock::new();
    let rooms = RoomStore::new(journal.clone(), clock.clone());
    let snapshots = SnapshotStore::new(journal, clock.clone());
    let sessions = Arc::new(SyncSessions::new(
        rooms.clone(),
        snapshots.clone(),
        clock.clone(),
        SessionConfig::default(),
    ));
    let presence = PresenceTracker::new(clock);
    Env { _dir: dir, rooms, snapshots, sessions, presence }
}

#[tokio::test]
async fn create_join_type_read_back() {
    let env = build();

    // Create: the key is 12 uppercase alphanumerics and parses back
    let room = env.rooms.create().unwrap();
    assert_eq!(room.join_key.as_str().len(), 12);
    assert_eq!(JoinKey::parse(room.join_key.as_str()), Some(room.join_key.clone()));

    // Join by key
    let found = env.rooms.find_by_join_key(&room.join_key).unwrap();
    env.rooms.mark_active(&found.id, "alice").unwrap();
    env.presence.join(&found.id, "alice");
    assert!(env.rooms.find_by_id(&found.id).unwrap().participant_count >= 1);

    // Type "hi" through the session manager
    env.sessions.initialize_document(&found.id).unwrap();
    let mut alice = Doc::new(100);
    let update = alice.insert(0, "hi").encode();
    let outcome = env.sessions.apply_client_update(&found.id, &update, None).unwrap();
    assert_eq!(outcome, AppliedUpdate::Applied);

    // Read back: the room's content contains what was typed
    assert_eq!(env.sessions.document_content(&found.id).unwrap(), "hi");
    env.sessions.cleanup_room(&found.id).unwrap();
    let stored = env.rooms.find_by_id(&found.id).unwrap();
    assert!(stored.code_snapshot.contains("hi"));
}

#[tokio::test]
async fn two_clients_converge_within_one_fanout_hop() {
    let env = build();
    let room = env.rooms.create().unwrap();
    let session = env.sessions.initialize_document(&room.id).unwrap();

    // Client B listens on the room's fan-out channel
    let mut rx = session.subscribe();

    let mut alice = Doc::new(100);
    let mut bob = Doc::new(200);

    let update = alice.insert(0, "X").encode();
    env.sessions
        .apply_client_update(&room.id, &update, Some("sock-alice"))
        .unwrap();

    // B receives the same bytes and converges
    let RoomMessage::Update { bytes, origin } = rx.try_recv().unwrap() else {
        panic!("expected an update message");
    };
    assert_eq!(origin.as_deref(), Some("sock-alice"));
    assert_eq!(bytes, update);
    bob.apply_bytes(&bytes).unwrap().unwrap();
    assert_eq!(bob.text(), "X");
    assert_eq!(bob.text(), alice.text());
    env.sessions.cleanup_room(&room.id).unwrap();
}

#[tokio::test]
async fn snapshot_then_restore_into_fresh_registry() {
    let env = build();
    let room = env.rooms.create().unwrap();
    env.sessions.initialize_document(&room.id).unwrap();

    let mut alice = Doc::new(100);
    let update = alice.insert(0, "fn main() {}").encode();
    env.sessions.apply_client_update(&room.id, &update, None).unwrap();
    env.sessions.create_snapshot(&room.id, SnapshotKind::Manual).unwrap();
    env.sessions.cleanup_room(&room.id).unwrap();

    // A brand-new registry restores the same text
    let fresh = Arc::new(SyncSessions::new(
        env.rooms.clone(),
        env.snapshots.clone(),
        FakeClock::new(),
        SessionConfig::default(),
    ));
    fresh.initialize_document(&room.id).unwrap();
    assert_eq!(fresh.document_content(&room.id).unwrap(), "fn main() {}");
    fresh.cleanup_room(&room.id).unwrap();
}
