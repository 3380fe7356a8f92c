// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

use super::*;
use serde_json::json;

fn frame(event: &'static str) -> ServerFrame {
    ServerFrame::new(event, json!({}))
}

#[tokio::test]
async fn broadcast_reaches_all_but_skipped_peer() {
    let registry = PeerRegistry::new();
    let room = RoomId::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    let (tx_b, mut rx_b) = mpsc::channel(8);
    registry.register(&room, "sock-a", tx_a);
    registry.register(&room, "sock-b", tx_b);

    registry.broadcast(&room, Some("sock-a"), frame("user-joined")).await;

    assert!(rx_a.try_recv().is_err(), "origin socket skipped");
    assert_eq!(rx_b.try_recv().unwrap().event, "user-joined");
}

#[tokio::test]
async fn broadcast_without_skip_reaches_everyone() {
    let registry = PeerRegistry::new();
    let room = RoomId::new();
    let (tx_a, mut rx_a) = mpsc::channel(8);
    registry.register(&room, "sock-a", tx_a);

    registry.broadcast(&room, None, frame("presence-update")).await;
    assert_eq!(rx_a.try_recv().unwrap().event, "presence-update");
}

#[tokio::test]
async fn rooms_are_isolated() {
    let registry = PeerRegistry::new();
    let room_a = RoomId::new();
    let room_b = RoomId::new();
    let (tx, mut rx) = mpsc::channel(8);
    registry.register(&room_a, "sock", tx);

    registry.broadcast(&room_b, None, frame("user-left")).await;
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn unregister_empties_the_room() {
    let registry = PeerRegistry::new();
    let room = RoomId::new();
    let (tx, _rx) = mpsc::channel(8);
    registry.register(&room, "sock", tx);
    assert_eq!(registry.peer_count(&room), 1);

    registry.unregister(&room, "sock");
    assert_eq!(registry.peer_count(&room), 0);
}
