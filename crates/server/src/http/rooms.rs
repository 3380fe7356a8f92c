// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Room endpoints: create, join, leave, read, update, participants,
//! cursor.

use crate::http::error::ApiError;
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use base64::Engine as _;
use duet_core::{Clock, Cursor, JoinKey, Participant, Room, RoomId};
use duet_sandbox::SandboxRunner;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Render an epoch-ms timestamp as ISO-8601 UTC.
pub(crate) fn iso(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Client key for the room rate limiters: proxy header first, else a
/// shared bucket.
pub(crate) fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "direct".to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub room_id: RoomId,
    pub room_key: String,
    pub created_at: String,
    pub last_activity: String,
    pub is_archived: bool,
    pub participant_count: u32,
    pub code_content: String,
}

impl RoomData {
    fn build<C: Clock + 'static>(room: &Room, state: &AppState<impl SandboxRunner, C>) -> Self {
        // Prefer the live document over the (debounced) persisted copy.
        let code_content = state
            .sessions
            .document_content(&room.id)
            .unwrap_or_else(|_| room.code_snapshot.clone());
        Self {
            room_id: room.id,
            room_key: room.join_key.as_str().to_string(),
            created_at: iso(room.created_at_ms),
            last_activity: iso(room.last_activity_ms),
            is_archived: room.is_archived,
            participant_count: room.participant_count,
            code_content,
        }
    }
}

fn rate_limited(quota: crate::http::rate_limit::Quota) -> ApiError {
    ApiError::RateLimited { limit: quota.limit, retry_after_secs: quota.reset_secs }
}

/// POST /rooms
pub async fn create_room<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let quota = state.create_limiter.check(&client_key(&headers));
    if !quota.allowed {
        return Err(rate_limited(quota));
    }

    let room = state.rooms.create()?;
    tracing::info!(room_id = %room.id, "room created");
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "roomKey": room.join_key.as_str(),
            "roomId": room.id,
            "createdAt": iso(room.created_at_ms),
        })),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinBody {
    pub room_key: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// POST /rooms/join
pub async fn join_room<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    headers: HeaderMap,
    Json(body): Json<JoinBody>,
) -> Result<Json<Value>, ApiError> {
    let quota = state.join_limiter.check(&client_key(&headers));
    if !quota.allowed {
        return Err(rate_limited(quota));
    }

    let key = JoinKey::parse(&body.room_key)
        .ok_or_else(|| ApiError::Validation("roomKey must match ^[A-Z0-9]{12}$".into()))?;
    let room = state.rooms.find_by_join_key(&key).ok_or(ApiError::NotFound("room"))?;

    let user_id = body
        .user_id
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| format!("user-{}", nanoid::nanoid!(8)));

    state.rooms.mark_active(&room.id, &user_id)?;
    state.presence.join(&room.id, &user_id);

    // Re-read so the participant count reflects this join.
    let room = state.rooms.find_by_id(&room.id).ok_or(ApiError::NotFound("room"))?;
    let crdt_state = (!room.crdt_state.is_empty())
        .then(|| base64::engine::general_purpose::STANDARD.encode(&room.crdt_state));

    tracing::info!(room_id = %room.id, user_id = %user_id, "participant joined");
    Ok(Json(json!({
        "roomData": RoomData::build(&room, &state),
        "crdtState": crdt_state,
        "userId": user_id,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaveBody {
    pub room_id: RoomId,
    pub user_id: String,
}

/// POST /rooms/leave
pub async fn leave_room<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    Json(body): Json<LeaveBody>,
) -> Result<Json<Value>, ApiError> {
    if body.user_id.is_empty() {
        return Err(ApiError::Validation("userId is required".into()));
    }
    state
        .rooms
        .mark_inactive(&body.room_id, &body.user_id)
        .map_err(|e| ApiError::internal("leave", e))?;
    state.presence.leave(&body.room_id, &body.user_id);
    Ok(Json(json!({ "ok": true })))
}

/// GET /rooms/{roomId}
pub async fn get_room<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    Path(room_id): Path<String>,
) -> Result<Json<RoomData>, ApiError> {
    let room_id = parse_room_id(&room_id)?;
    let room = state.rooms.find_by_id(&room_id).ok_or(ApiError::NotFound("room"))?;
    Ok(Json(RoomData::build(&room, &state)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoomBody {
    pub content: String,
    #[serde(default)]
    pub crdt_state: Option<String>,
}

/// PUT /rooms/{roomId}
pub async fn update_room<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    Path(room_id): Path<String>,
    Json(body): Json<UpdateRoomBody>,
) -> Result<Json<Value>, ApiError> {
    let room_id = parse_room_id(&room_id)?;
    let crdt_state = body
        .crdt_state
        .map(|encoded| {
            base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|_| ApiError::Validation("crdtState is not valid base64".into()))
        })
        .transpose()?;

    state.rooms.update_snapshot(&room_id, &body.content, crdt_state)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantData {
    pub user_id: String,
    pub color: String,
    pub is_active: bool,
    pub joined_at: String,
    pub last_seen: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<Cursor>,
}

impl From<&Participant> for ParticipantData {
    fn from(p: &Participant) -> Self {
        Self {
            user_id: p.user_id.clone(),
            color: p.color.clone(),
            is_active: p.is_active,
            joined_at: iso(p.joined_at_ms),
            last_seen: iso(p.last_seen_ms),
            cursor: p.cursor,
        }
    }
}

/// GET /rooms/{roomId}/participants
pub async fn get_participants<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    Path(room_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let room_id = parse_room_id(&room_id)?;
    if state.rooms.find_by_id(&room_id).is_none() {
        return Err(ApiError::NotFound("room"));
    }
    let participants: Vec<ParticipantData> =
        state.rooms.participants(&room_id).iter().map(ParticipantData::from).collect();
    let count = participants.iter().filter(|p| p.is_active).count();
    Ok(Json(json!({ "participants": participants, "count": count })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorBody {
    pub user_id: String,
    pub cursor_position: CursorPosition,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorPosition {
    pub line_number: u32,
    pub column: u32,
}

/// PUT /rooms/{roomId}/cursor
pub async fn update_cursor<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    Path(room_id): Path<String>,
    Json(body): Json<CursorBody>,
) -> Result<Json<Value>, ApiError> {
    let room_id = parse_room_id(&room_id)?;
    let cursor = Cursor { line: body.cursor_position.line_number, column: body.cursor_position.column };
    if !cursor.is_valid() {
        return Err(ApiError::Validation("lineNumber must be >= 1".into()));
    }
    state
        .rooms
        .update_cursor(&room_id, &body.user_id, cursor)
        .map_err(|e| ApiError::internal("cursor", e))?;
    state.presence.update_cursor(&room_id, &body.user_id, cursor);
    Ok(Json(json!({ "ok": true })))
}

/// Shape-check a path room id.
pub(crate) fn parse_room_id(raw: &str) -> Result<RoomId, ApiError> {
    RoomId::parse(raw).ok_or_else(|| ApiError::Validation("invalid room id".into()))
}

#[cfg(test)]
#[path = "rooms_tests.rs"]
mod tests;
