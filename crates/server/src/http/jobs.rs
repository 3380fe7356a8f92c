// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Compile endpoints: submit, status, cancel.

use crate::http::error::ApiError;
use crate::http::rooms::{iso, parse_room_id};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use duet_core::{Clock, JobId, JobState, OptionsPatch};
use duet_sandbox::SandboxRunner;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub room_id: String,
    pub user_id: String,
    pub code: String,
    #[serde(default)]
    pub options: Option<OptionsPatch>,
}

/// POST /compile
pub async fn submit<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    Json(body): Json<SubmitBody>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if body.user_id.is_empty() {
        return Err(ApiError::Validation("userId is required".into()));
    }
    let room_id = parse_room_id(&body.room_id)?;
    if state.rooms.find_by_id(&room_id).is_none() {
        return Err(ApiError::Validation("unknown room".into()));
    }

    let job_id = state.dispatcher.queue_job(
        room_id,
        &body.user_id,
        &body.code,
        body.options.unwrap_or_default(),
    )?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "jobId": job_id, "state": JobState::Queued.to_string() })),
    ))
}

/// GET /compile/{jobId}
pub async fn status<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    Path(job_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    // A malformed id cannot name a job; same 404 as an unknown one.
    let job_id = JobId::parse(&job_id).ok_or(ApiError::NotFound("job"))?;
    let status = state.dispatcher.job_status(&job_id).ok_or(ApiError::NotFound("job"))?;

    let mut body = json!({
        "jobId": status.job_id,
        "state": status.state.to_string(),
        "timestamp": iso(state.clock.epoch_ms()),
    });
    if let Some(position) = status.queue_position {
        body["queuePosition"] = json!(position);
    }
    if let Some(result) = status.result {
        body["result"] = serde_json::to_value(result)
            .map_err(|e| ApiError::internal("status serialization", e))?;
    }
    Ok(Json(body))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelQuery {
    pub user_id: String,
}

/// DELETE /compile/{jobId}?userId=…
pub async fn cancel<R: SandboxRunner, C: Clock + 'static>(
    State(state): State<AppState<R, C>>,
    Path(job_id): Path<String>,
    Query(query): Query<CancelQuery>,
) -> Result<Json<Value>, ApiError> {
    let job_id =
        JobId::parse(&job_id).ok_or_else(|| ApiError::Validation("invalid job id".into()))?;
    let cancelled = state
        .dispatcher
        .cancel_job(&job_id, &query.user_id)
        .map_err(|e| ApiError::internal("cancel", e))?;

    if !cancelled {
        return Err(ApiError::Validation(
            "job cannot be cancelled (unknown, finished, or not yours)".into(),
        ));
    }
    Ok(Json(json!({ "jobId": job_id, "state": JobState::Cancelled.to_string() })))
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
