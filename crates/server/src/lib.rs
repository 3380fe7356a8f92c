// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! duet-server: the control surface and execution dispatcher.
//!
//! Stateless HTTP/WebSocket adapters over the stores, the CRDT session
//! manager, and the sandbox pool. All long-lived state lives in those
//! components; this crate wires them together, runs the worker lanes
//! and the background supervisor, and owns process lifecycle.

pub mod dispatch;
pub mod env;
pub mod http;
pub mod state;
pub mod supervisor;
pub mod ws;

#[cfg(test)]
pub(crate) mod test_support;

pub use dispatch::{AdmissionError, DispatchConfig, Dispatcher, JobStatus};
pub use state::AppState;
