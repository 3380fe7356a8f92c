// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Per-room registry of connected sockets for presence fan-out.

use crate::ws::messages::ServerFrame;
use duet_core::RoomId;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Socket senders by room. Presence and membership frames fan out
/// through here; CRDT frames ride the room session broadcast instead.
#[derive(Default)]
pub struct PeerRegistry {
    rooms: Mutex<HashMap<RoomId, HashMap<String, mpsc::Sender<ServerFrame>>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, room_id: &RoomId, socket_id: &str, tx: mpsc::Sender<ServerFrame>) {
        self.rooms
            .lock()
            .entry(*room_id)
            .or_default()
            .insert(socket_id.to_string(), tx);
    }

    pub fn unregister(&self, room_id: &RoomId, socket_id: &str) {
        let mut rooms = self.rooms.lock();
        if let Some(peers) = rooms.get_mut(room_id) {
            peers.remove(socket_id);
            if peers.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    /// Number of sockets currently subscribed to a room.
    pub fn peer_count(&self, room_id: &RoomId) -> usize {
        self.rooms.lock().get(room_id).map(|p| p.len()).unwrap_or(0)
    }

    /// Send a frame to every room peer except `skip`.
    pub async fn broadcast(&self, room_id: &RoomId, skip: Option<&str>, frame: ServerFrame) {
        let targets: Vec<mpsc::Sender<ServerFrame>> = {
            let rooms = self.rooms.lock();
            match rooms.get(room_id) {
                Some(peers) => peers
                    .iter()
                    .filter(|(id, _)| skip != Some(id.as_str()))
                    .map(|(_, tx)| tx.clone())
                    .collect(),
                None => return,
            }
        };
        for tx in targets {
            // A full or closed outbound queue is the receiver's problem;
            // the disconnect path cleans the registry up.
            let _ = tx.try_send(frame.clone());
        }
    }
}

#[cfg(test)]
#[path = "peers_tests.rs"]
mod tests;
