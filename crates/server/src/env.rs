// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Centralized environment variable access for the server crate.

use duet_core::{parse_memory_limit, ExecLimits};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnvError {
    #[error("cannot resolve a state directory (set DUET_STATE_DIR or HOME)")]
    NoStateDir,
}

/// Resolved service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (journal, checkpoints, sandbox workspaces).
    pub state_dir: PathBuf,
    pub port: u16,
    /// Externally visible base URL, for logs only.
    pub app_url: Option<String>,
    /// WebSocket endpoint path.
    pub ws_path: String,
    /// Global execution caps applied at admission.
    pub limits: ExecLimits,
    /// Raw memory cap string passed through to the sandbox.
    pub max_memory_limit: String,
    /// Per-user submissions per rolling window.
    pub rate_limit_max: usize,
    pub rate_limit_window_ms: u64,
    /// Sandbox container image.
    pub sandbox_image: String,
    /// Concurrent sandbox cap.
    pub max_sandboxes: usize,
    /// Worker lanes consuming the execution queue.
    pub worker_count: usize,
}

impl Config {
    /// Load configuration from the environment, with service defaults.
    pub fn load() -> Result<Self, EnvError> {
        let max_memory_limit = var("MAX_MEMORY_LIMIT").unwrap_or_else(|| "128m".to_string());
        let limits = ExecLimits {
            max_wall_timeout_ms: parse_var("MAX_EXECUTION_TIME_MS").unwrap_or(30_000),
            max_memory_limit_bytes: parse_memory_limit(&max_memory_limit)
                .unwrap_or(128 * 1024 * 1024),
            max_cpu_cores: var("MAX_CPU_LIMIT")
                .and_then(|s| s.parse::<f64>().ok())
                .unwrap_or(0.5),
        };

        Ok(Self {
            state_dir: state_dir()?,
            port: parse_var("PORT").unwrap_or(8080),
            app_url: var("APP_URL"),
            ws_path: var("DUET_WS_PATH").unwrap_or_else(|| "/ws".to_string()),
            limits,
            max_memory_limit,
            rate_limit_max: parse_var("RATE_LIMIT_MAX").unwrap_or(5),
            rate_limit_window_ms: parse_var("RATE_LIMIT_WINDOW_MS").unwrap_or(60_000),
            sandbox_image: var("DUET_SANDBOX_IMAGE").unwrap_or_else(|| "gcc:13".to_string()),
            max_sandboxes: parse_var("DUET_MAX_SANDBOXES").unwrap_or(5),
            worker_count: parse_var("DUET_WORKER_COUNT").unwrap_or(3),
        })
    }
}

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|s| s.parse().ok())
}

/// Resolve state directory: DUET_STATE_DIR > XDG_STATE_HOME/duet >
/// ~/.local/state/duet
pub fn state_dir() -> Result<PathBuf, EnvError> {
    if let Some(dir) = var("DUET_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Some(xdg) = var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("duet"));
    }
    let home = std::env::var("HOME").map_err(|_| EnvError::NoStateDir)?;
    Ok(PathBuf::from(home).join(".local/state/duet"))
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
