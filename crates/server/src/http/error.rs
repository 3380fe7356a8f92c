// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! HTTP error mapping.
//!
//! Validation, NotFound, Archived, and admission refusals surface with
//! their contract status codes; anything else logs with context and
//! returns a generic 500 that never leaks internals.

use crate::dispatch::AdmissionError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use duet_storage::StoreError;
use duet_sync::SyncError;
use serde_json::json;

/// Error as surfaced at the control surface.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(&'static str),
    Archived,
    RateLimited { limit: usize, retry_after_secs: u64 },
    QueueFull,
    Internal(String),
}

impl ApiError {
    pub fn internal(context: &str, err: impl std::fmt::Display) -> Self {
        tracing::error!(context, error = %err, "internal error");
        ApiError::Internal(context.to_string())
    }
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        match e {
            AdmissionError::Validation(msg) => ApiError::Validation(msg),
            AdmissionError::QueueFull => ApiError::QueueFull,
            AdmissionError::RateLimited { limit, retry_after_secs } => {
                ApiError::RateLimited { limit, retry_after_secs }
            }
            AdmissionError::Store(e) => ApiError::internal("admission", e),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::RoomNotFound => ApiError::NotFound("room"),
            StoreError::Archived => ApiError::Archived,
            other => ApiError::internal("store", other),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(e: SyncError) -> Self {
        match e {
            SyncError::InvalidUpdate(err) => ApiError::Validation(err.to_string()),
            SyncError::Store(err) => err.into(),
            SyncError::NotInitialized => ApiError::NotFound("room document"),
            other => ApiError::internal("sync", other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
            }
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{what} not found") })),
            )
                .into_response(),
            ApiError::Archived => (
                StatusCode::GONE,
                Json(json!({ "error": "room is archived" })),
            )
                .into_response(),
            ApiError::RateLimited { limit, retry_after_secs } => {
                let body = Json(json!({ "error": "rate limit exceeded" }));
                let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
                let headers = response.headers_mut();
                headers.insert("X-RateLimit-Limit", limit.into());
                headers.insert("X-RateLimit-Remaining", 0.into());
                headers.insert("X-RateLimit-Reset", retry_after_secs.into());
                response
            }
            ApiError::QueueFull => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "execution queue is full, retry later" })),
            )
                .into_response(),
            ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal server error" })),
            )
                .into_response(),
        }
    }
}
