// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! WebSocket endpoint: CRDT sync and presence.
//!
//! One connection may join several rooms. CRDT fan-out rides each
//! room's session broadcast (apply-lane order); presence and membership
//! frames go through the peer registry, which carries no cross-frame
//! ordering guarantee.

pub mod messages;
mod peers;

pub use peers::PeerRegistry;

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use duet_core::{Clock, Cursor, RoomId};
use duet_sandbox::SandboxRunner;
use duet_sync::{AppliedUpdate, RoomMessage, SyncError, UpdateError};
use futures_util::{SinkExt, StreamExt};
use messages::*;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;

/// Server ping cadence.
const PING_INTERVAL: Duration = Duration::from_secs(25);

/// A connection silent for this long is dropped.
const PING_TIMEOUT: Duration = Duration::from_secs(60);

/// Outbound queue depth per connection.
const OUTBOUND_BUFFER: usize = 256;

/// GET {ws_path} — upgrade to the sync/presence protocol.
pub async fn ws_handler<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

struct JoinedRoom {
    user_id: String,
    fanout: tokio::task::JoinHandle<()>,
}

struct Connection<R, C: Clock> {
    state: AppState<R, C>,
    socket_id: String,
    out: mpsc::Sender<ServerFrame>,
    joined: HashMap<RoomId, JoinedRoom>,
}

async fn handle_socket<R: SandboxRunner, C: Clock + 'static>(
    state: AppState<R, C>,
    socket: WebSocket,
) {
    let socket_id = format!("sock-{}", nanoid::nanoid!(10));
    tracing::info!(socket_id = %socket_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerFrame>(OUTBOUND_BUFFER);

    // Writer task: per-connection I/O is serialized through this queue.
    // The internal `__ping__` marker becomes a protocol-level ping and
    // never reaches the client as a JSON frame.
    let writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if frame.event == "__ping__" {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    return;
                }
                continue;
            }
            let Ok(text) = serde_json::to_string(&frame) else { continue };
            if sink.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
        let _ = sink.close().await;
    });

    let mut conn = Connection {
        state,
        socket_id: socket_id.clone(),
        out: out_tx.clone(),
        joined: HashMap::new(),
    };

    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut last_heard = tokio::time::Instant::now();

    loop {
        tokio::select! {
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        last_heard = tokio::time::Instant::now();
                        conn.handle_text(&text).await;
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        last_heard = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Binary(_))) => {
                        last_heard = tokio::time::Instant::now();
                        conn.send_error("binary frames are not part of the protocol").await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(socket_id = %socket_id, error = %e, "websocket read error");
                        break;
                    }
                }
            }
            _ = ping.tick() => {
                if last_heard.elapsed() > PING_TIMEOUT {
                    tracing::info!(socket_id = %socket_id, "heartbeat timeout, dropping connection");
                    break;
                }
                let _ = conn.out.send(ServerFrame::new("__ping__", json!({}))).await;
            }
        }
    }

    conn.disconnect().await;
    // Release every sender so the writer drains and closes the sink.
    drop(conn);
    drop(out_tx);
    let _ = writer.await;
    tracing::info!(socket_id = %socket_id, "websocket disconnected");
}

impl<R: SandboxRunner, C: Clock + 'static> Connection<R, C> {
    async fn send(&self, event: &'static str, data: serde_json::Value) {
        let _ = self.out.send(ServerFrame::new(event, data)).await;
    }

    async fn send_error(&self, message: &str) {
        self.send("error", json!({ "message": message })).await;
    }

    async fn send_crdt_error(&self, code: CrdtErrorCode, message: &str) {
        self.send("crdt-error", json!({ "message": message, "code": code })).await;
    }

    async fn handle_text(&mut self, text: &str) {
        let frame: ClientFrame = match serde_json::from_str(text) {
            Ok(frame) => frame,
            Err(e) => {
                self.send_error(&format!("malformed frame: {e}")).await;
                return;
            }
        };

        match frame.event.as_str() {
            "join-room" => self.on_join(frame.data).await,
            "leave-room" => self.on_leave(frame.data).await,
            "get-document" => self.on_get_document(frame.data).await,
            "crdt-sync-request" => self.on_sync_request(frame.data).await,
            "crdt-sync-step1" => self.on_sync_step1(frame.data).await,
            "crdt-update" => self.on_crdt_update(frame.data).await,
            "cursor-update" => self.on_cursor_update(frame.data).await,
            "presence-update" => self.on_presence_update(frame.data).await,
            "ping" => self.send("pong", json!({})).await,
            other => self.send_error(&format!("unknown event: {other}")).await,
        }
    }

    /// Parse a frame payload or emit a validation error.
    async fn parse<T: serde::de::DeserializeOwned>(
        &self,
        data: serde_json::Value,
    ) -> Option<T> {
        match serde_json::from_value(data) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                self.send_error(&format!("invalid payload: {e}")).await;
                None
            }
        }
    }

    async fn on_join(&mut self, data: serde_json::Value) {
        let Some(body): Option<JoinRoom> = self.parse(data).await else { return };
        let user_id = body.user_id.clone();

        if let Err(e) = self.state.rooms.mark_active(&body.room_id, &user_id) {
            self.send_error(&format!("cannot join room: {e}")).await;
            return;
        }
        let record = self.state.presence.join(&body.room_id, &user_id);

        let session = match self.state.sessions.initialize_document(&body.room_id) {
            Ok(session) => session,
            Err(e) => {
                self.send_error(&format!("cannot open document: {e}")).await;
                return;
            }
        };

        // CRDT fan-out: forward the room lane's broadcasts, skipping
        // frames this connection originated.
        let fanout = {
            let mut rx = session.subscribe();
            let out = self.out.clone();
            let socket_id = self.socket_id.clone();
            let room_id = body.room_id;
            tokio::spawn(async move {
                loop {
                    match rx.recv().await {
                        Ok(RoomMessage::Update { bytes, origin }) => {
                            if origin.as_deref() == Some(socket_id.as_str()) {
                                continue;
                            }
                            let frame = ServerFrame::new(
                                "crdt-update",
                                json!({ "roomId": room_id, "update": bytes }),
                            );
                            if out.send(frame).await.is_err() {
                                return;
                            }
                        }
                        Ok(RoomMessage::ConflictResolved { state }) => {
                            let frame = ServerFrame::new(
                                "crdt-conflict-resolved",
                                json!({ "roomId": room_id, "resolvedState": state }),
                            );
                            if out.send(frame).await.is_err() {
                                return;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(room_id = %room_id, skipped, "fan-out lagged");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                    }
                }
            })
        };

        if let Some(previous) = self
            .joined
            .insert(body.room_id, JoinedRoom { user_id: user_id.clone(), fanout })
        {
            previous.fanout.abort();
        }
        self.state.ws_peers.register(&body.room_id, &self.socket_id, self.out.clone());

        let presence: Vec<_> = self
            .state
            .presence
            .snapshot(&body.room_id)
            .into_iter()
            .map(|(user_id, record)| json!({ "userId": user_id, "presence": record }))
            .collect();

        self.send(
            "room-joined",
            json!({
                "roomId": body.room_id,
                "userId": user_id.clone(),
                "socketId": self.socket_id.clone(),
                "presence": presence,
            }),
        )
        .await;

        // userName/userColor are client display hints, echoed to peers.
        self.state
            .ws_peers
            .broadcast(
                &body.room_id,
                Some(&self.socket_id),
                ServerFrame::new(
                    "user-joined",
                    json!({
                        "roomId": body.room_id,
                        "userId": user_id,
                        "color": record.color,
                        "userName": body.user_name,
                        "userColor": body.user_color,
                    }),
                ),
            )
            .await;

        // Soft integrity warnings surface to the joining client.
        if let Ok(report) = self.state.sessions.validate_integrity(&body.room_id) {
            if !report.warnings.is_empty() {
                self.send("crdt-warning", json!({ "warnings": report.warnings })).await;
            }
        }
    }

    async fn on_leave(&mut self, data: serde_json::Value) {
        let Some(body): Option<LeaveRoom> = self.parse(data).await else { return };
        if self.joined.contains_key(&body.room_id) {
            self.leave_room(&body.room_id).await;
        } else {
            // Not subscribed on this connection (joined over HTTP);
            // still mark the participant inactive.
            let _ = self.state.rooms.mark_inactive(&body.room_id, &body.user_id);
            self.state.presence.leave(&body.room_id, &body.user_id);
        }
    }

    async fn leave_room(&mut self, room_id: &RoomId) {
        let Some(joined) = self.joined.remove(room_id) else { return };
        joined.fanout.abort();
        self.state.ws_peers.unregister(room_id, &self.socket_id);

        let _ = self.state.rooms.mark_inactive(room_id, &joined.user_id);
        self.state.presence.leave(room_id, &joined.user_id);

        self.state
            .ws_peers
            .broadcast(
                room_id,
                Some(&self.socket_id),
                ServerFrame::new(
                    "user-left",
                    json!({ "roomId": room_id, "userId": joined.user_id }),
                ),
            )
            .await;
    }

    async fn on_get_document(&self, data: serde_json::Value) {
        let Some(body): Option<RoomOnly> = self.parse(data).await else { return };
        match self.state.sessions.document_content(&body.room_id) {
            Ok(content) => {
                self.send(
                    "document-content",
                    json!({ "roomId": body.room_id, "content": content }),
                )
                .await
            }
            Err(e) => self.send_error(&format!("no document: {e}")).await,
        }
    }

    async fn on_sync_request(&self, data: serde_json::Value) {
        let Some(body): Option<RoomOnly> = self.parse(data).await else { return };
        match self.state.sessions.sync_state(&body.room_id) {
            Ok((state_vector, update)) => {
                self.send(
                    "crdt-sync-response",
                    json!({
                        "roomId": body.room_id,
                        "stateVector": state_vector,
                        "update": update,
                    }),
                )
                .await
            }
            Err(e) => {
                self.send_crdt_error(CrdtErrorCode::SyncRequest, &e.to_string()).await
            }
        }
    }

    async fn on_sync_step1(&self, data: serde_json::Value) {
        let Some(body): Option<SyncStep1> = self.parse(data).await else { return };
        let sv = body.state_vector.unwrap_or_default();
        match self.state.sessions.sync_delta(&body.room_id, &sv) {
            Ok(update) => {
                self.send(
                    "crdt-sync-step2",
                    json!({ "roomId": body.room_id, "update": update }),
                )
                .await
            }
            Err(e) => {
                self.send_crdt_error(CrdtErrorCode::SyncStep1, &e.to_string()).await
            }
        }
    }

    async fn on_crdt_update(&self, data: serde_json::Value) {
        let Some(body): Option<CrdtUpdate> = self.parse(data).await else { return };

        // A client-supplied origin replaces the socket id in the fan-out
        // skip check. Applying one's own echo is a no-op anyway, so a
        // custom origin only trades suppression for client-side dedup.
        let origin = body.origin.as_deref().unwrap_or(self.socket_id.as_str());
        match self.state.sessions.apply_client_update(
            &body.room_id,
            &body.update,
            Some(origin),
        ) {
            // Fan-out already queued by the apply lane.
            Ok(AppliedUpdate::Applied) => {}
            Ok(AppliedUpdate::ConflictResolved(state)) => {
                self.send(
                    "crdt-conflict-resolved",
                    json!({ "roomId": body.room_id, "resolvedState": state }),
                )
                .await;
            }
            Err(SyncError::InvalidUpdate(UpdateError::Empty)) => {
                self.send_crdt_error(CrdtErrorCode::InvalidUpdate, "empty update").await
            }
            Err(SyncError::InvalidUpdate(e)) => {
                self.send_crdt_error(CrdtErrorCode::InvalidUpdate, &e.to_string()).await
            }
            Err(SyncError::ConflictResolutionFailed(message)) => {
                self.send_crdt_error(CrdtErrorCode::ConflictResolutionFailed, &message).await
            }
            Err(e) => self.send_crdt_error(CrdtErrorCode::UpdateError, &e.to_string()).await,
        }
    }

    async fn on_cursor_update(&self, data: serde_json::Value) {
        let Some(body): Option<CursorUpdate> = self.parse(data).await else { return };
        let Some(user_id) = self.joined.get(&body.room_id).map(|j| j.user_id.clone()) else {
            self.send_error("cursor-update for a room this connection has not joined").await;
            return;
        };
        let cursor: Cursor = body.cursor.into();
        if !cursor.is_valid() {
            self.send_error("lineNumber must be >= 1").await;
            return;
        }

        if let Err(e) = self.state.rooms.update_cursor(&body.room_id, &user_id, cursor) {
            tracing::error!(room_id = %body.room_id, error = %e, "cursor persist failed");
            self.send("server-error", json!({ "message": "cursor update failed" })).await;
            return;
        }
        self.state.presence.update_cursor(&body.room_id, &user_id, cursor);

        self.state
            .ws_peers
            .broadcast(
                &body.room_id,
                Some(&self.socket_id),
                ServerFrame::new(
                    "cursor-update",
                    json!({ "roomId": body.room_id, "userId": user_id, "cursor": body.cursor }),
                ),
            )
            .await;
    }

    async fn on_presence_update(&self, data: serde_json::Value) {
        let Some(body): Option<PresenceUpdate> = self.parse(data).await else { return };
        let Some(user_id) = self.joined.get(&body.room_id).map(|j| j.user_id.clone()) else {
            self.send_error("presence-update for a room this connection has not joined").await;
            return;
        };

        let active = body
            .presence
            .get("active")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        if let Err(e) = self.state.rooms.update_presence(&body.room_id, &user_id, active) {
            tracing::error!(room_id = %body.room_id, error = %e, "presence persist failed");
            self.send("server-error", json!({ "message": "presence update failed" })).await;
            return;
        }
        self.state.presence.update_presence(&body.room_id, &user_id, active);

        self.state
            .ws_peers
            .broadcast(
                &body.room_id,
                Some(&self.socket_id),
                ServerFrame::new(
                    "presence-update",
                    json!({
                        "roomId": body.room_id,
                        "userId": user_id,
                        "presence": body.presence,
                    }),
                ),
            )
            .await;
    }

    /// Heartbeat failure or socket close: every joined participant goes
    /// inactive.
    async fn disconnect(&mut self) {
        let rooms: Vec<RoomId> = self.joined.keys().copied().collect();
        for room_id in rooms {
            self.leave_room(&room_id).await;
        }
    }
}
