// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

use super::*;
use async_trait::async_trait;
use duet_core::{ExecResult, FakeClock};
use duet_sandbox::PoolEventKind;
use duet_storage::Journal;
use std::time::Duration;
use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

/// Runner scripted by markers in the submitted code.
struct ScriptedRunner;

#[async_trait]
impl SandboxRunner for ScriptedRunner {
    async fn run(
        &self,
        _job_id: &JobId,
        code: &str,
        options: &duet_core::ExecOptions,
    ) -> ExecResult {
        if code.contains("INFINITE_LOOP") {
            return ExecResult {
                success: false,
                timed_out: true,
                execution_time_ms: options.wall_timeout_ms + 50,
                ..ExecResult::default()
            };
        }
        if code.contains("SYNTAX_ERROR") {
            return ExecResult {
                success: false,
                stderr: "main.cpp:1:1: error: expected unqualified-id".into(),
                exit_code: Some(1),
                execution_time_ms: 120,
                ..ExecResult::default()
            };
        }
        if code.contains("SETUP_FAIL") {
            return ExecResult::setup_failure("docker unavailable");
        }
        ExecResult {
            success: true,
            stdout: "Hello".into(),
            exit_code: Some(0),
            execution_time_ms: 240,
            memory_bytes: Some(4 << 20),
            ..ExecResult::default()
        }
    }

    async fn kill(&self, _job_id: &JobId) {}
}

struct Fixture {
    _dir: tempfile::TempDir,
    dispatcher: Arc<Dispatcher<ScriptedRunner, FakeClock>>,
    clock: FakeClock,
    room_id: RoomId,
}

fn setup() -> Fixture {
    let dir = tempdir().unwrap();
    let journal = Journal::open(dir.path()).unwrap();
    let clock = FakeClock::new();
    let jobs = JobStore::new(journal.clone(), clock.clone());
    let queue = QueueStore::new(journal, clock.clone());
    let pool = Arc::new(SandboxPool::new(ScriptedRunner, clock.clone(), 5));
    let dispatcher =
        Arc::new(Dispatcher::new(jobs, queue, pool, DispatchConfig::default()));
    Fixture { _dir: dir, dispatcher, clock, room_id: RoomId::new() }
}

fn hello_code() -> &'static str {
    "#include<iostream>\nint main(){std::cout<<\"Hello\";return 0;}"
}

async fn drive_one(fx: &Fixture) {
    let item = fx.dispatcher.queue.take_next("w0").unwrap().unwrap();
    worker::process_item(&fx.dispatcher, "w0", &item).await.unwrap();
}

#[tokio::test]
async fn hello_world_job_completes() {
    let fx = setup();
    let job_id = fx
        .dispatcher
        .queue_job(fx.room_id, "alice", hello_code(), OptionsPatch::default())
        .unwrap();

    let status = fx.dispatcher.job_status(&job_id).unwrap();
    assert_eq!(status.state, JobState::Queued);
    assert_eq!(status.queue_position, Some(1));

    drive_one(&fx).await;

    let status = fx.dispatcher.job_status(&job_id).unwrap();
    assert_eq!(status.state, JobState::Completed);
    let result = status.result.unwrap();
    assert_eq!(result.stdout, "Hello");
    assert_eq!(result.exit_code, Some(0));
    assert!(!result.timed_out);
}

#[tokio::test]
async fn compilation_failure_is_terminal_failed() {
    let fx = setup();
    let job_id = fx
        .dispatcher
        .queue_job(fx.room_id, "alice", "SYNTAX_ERROR int main(", OptionsPatch::default())
        .unwrap();
    drive_one(&fx).await;

    let status = fx.dispatcher.job_status(&job_id).unwrap();
    assert_eq!(status.state, JobState::Failed);
    let result = status.result.unwrap();
    assert!(result.stderr.contains("error"));
    assert_ne!(result.exit_code, Some(0));
    // Verdict delivered: no retry
    assert_eq!(fx.dispatcher.queue_stats().completed, 1);
}

#[tokio::test]
async fn timeout_is_terminal_with_wall_time() {
    let fx = setup();
    let patch = OptionsPatch { wall_timeout_ms: Some(3_000), ..OptionsPatch::default() };
    let job_id = fx
        .dispatcher
        .queue_job(fx.room_id, "alice", "INFINITE_LOOP while(1);", patch)
        .unwrap();
    drive_one(&fx).await;

    let status = fx.dispatcher.job_status(&job_id).unwrap();
    assert_eq!(status.state, JobState::Timeout);
    let result = status.result.unwrap();
    assert!(result.timed_out);
    assert!(result.execution_time_ms.unwrap() >= 3_000);
}

#[tokio::test]
async fn setup_failure_retries_then_fails() {
    let fx = setup();
    let job_id = fx
        .dispatcher
        .queue_job(fx.room_id, "alice", "SETUP_FAIL", OptionsPatch::default())
        .unwrap();

    // Attempts 1 and 2 retry with growing backoff
    for expected_backoff in [RETRY_BASE_MS, RETRY_BASE_MS * 2] {
        drive_one(&fx).await;
        assert_eq!(fx.dispatcher.job_status(&job_id).unwrap().state, JobState::Running);
        assert_eq!(fx.dispatcher.queue_stats().delayed, 1);
        fx.clock.advance(Duration::from_millis(expected_backoff + 100));
    }

    // Attempt 3 exhausts the policy
    drive_one(&fx).await;
    let status = fx.dispatcher.job_status(&job_id).unwrap();
    assert_eq!(status.state, JobState::Failed);
    assert!(status.result.unwrap().stderr.contains("sandbox setup failed"));
    assert_eq!(fx.dispatcher.queue_stats().failed, 1);
}

#[tokio::test]
async fn validation_rejects_oversized_and_empty_code() {
    let fx = setup();
    let big = "x".repeat(duet_core::exec::MAX_CODE_BYTES + 1);
    assert!(matches!(
        fx.dispatcher.queue_job(fx.room_id, "alice", &big, OptionsPatch::default()),
        Err(AdmissionError::Validation(_))
    ));
    assert!(matches!(
        fx.dispatcher.queue_job(fx.room_id, "alice", "", OptionsPatch::default()),
        Err(AdmissionError::Validation(_))
    ));
}

#[tokio::test]
async fn validation_rejects_bad_options() {
    let fx = setup();
    let patch = OptionsPatch { wall_timeout_ms: Some(100), ..OptionsPatch::default() };
    assert!(matches!(
        fx.dispatcher.queue_job(fx.room_id, "alice", hello_code(), patch),
        Err(AdmissionError::Validation(_))
    ));
}

#[tokio::test]
async fn rate_limit_law_five_per_window() {
    let fx = setup();
    for n in 0..5 {
        fx.dispatcher
            .queue_job(fx.room_id, "alice", hello_code(), OptionsPatch::default())
            .unwrap_or_else(|e| panic!("submission {n} refused: {e}"));
    }
    // The sixth inside the window is refused
    assert!(matches!(
        fx.dispatcher.queue_job(fx.room_id, "alice", hello_code(), OptionsPatch::default()),
        Err(AdmissionError::RateLimited { limit: 5, .. })
    ));
    // Other users are unaffected
    fx.dispatcher
        .queue_job(fx.room_id, "bob", hello_code(), OptionsPatch::default())
        .unwrap();

    // Once the window slides past, alice may submit again
    fx.clock.advance(Duration::from_secs(61));
    fx.dispatcher
        .queue_job(fx.room_id, "alice", hello_code(), OptionsPatch::default())
        .unwrap();
}

#[tokio::test]
async fn queue_saturation_refuses_admission() {
    let fx = setup();
    // Many distinct users fill the queue past the cap
    for n in 0..QUEUE_SATURATION {
        fx.dispatcher
            .queue_job(fx.room_id, &format!("user-{n}"), hello_code(), OptionsPatch::default())
            .unwrap();
    }
    assert!(matches!(
        fx.dispatcher.queue_job(fx.room_id, "late", hello_code(), OptionsPatch::default()),
        Err(AdmissionError::QueueFull)
    ));
}

#[tokio::test]
async fn cancel_queued_job_never_invokes_the_sandbox() {
    let fx = setup();
    let job_id = fx
        .dispatcher
        .queue_job(fx.room_id, "alice", hello_code(), OptionsPatch::default())
        .unwrap();

    let mut events = fx.dispatcher.pool().subscribe();
    assert!(fx.dispatcher.cancel_job(&job_id, "alice").unwrap());

    let status = fx.dispatcher.job_status(&job_id).unwrap();
    assert_eq!(status.state, JobState::Cancelled);

    // Queue item is gone; an idle worker finds nothing
    assert!(fx.dispatcher.queue.take_next("w0").unwrap().is_none());
    // No sandbox lifecycle event was ever recorded
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test]
async fn cancel_requires_matching_user() {
    let fx = setup();
    let job_id = fx
        .dispatcher
        .queue_job(fx.room_id, "alice", hello_code(), OptionsPatch::default())
        .unwrap();
    assert!(!fx.dispatcher.cancel_job(&job_id, "mallory").unwrap());
    assert_eq!(fx.dispatcher.job_status(&job_id).unwrap().state, JobState::Queued);
}

#[tokio::test]
async fn cancel_terminal_job_returns_false() {
    let fx = setup();
    let job_id = fx
        .dispatcher
        .queue_job(fx.room_id, "alice", hello_code(), OptionsPatch::default())
        .unwrap();
    drive_one(&fx).await;
    assert!(!fx.dispatcher.cancel_job(&job_id, "alice").unwrap());
    assert_eq!(fx.dispatcher.job_status(&job_id).unwrap().state, JobState::Completed);
}

#[tokio::test]
async fn unknown_job_status_is_none() {
    let fx = setup();
    assert!(fx.dispatcher.job_status(&JobId::new()).is_none());
}

#[tokio::test]
async fn queue_positions_rank_waiting_jobs() {
    let fx = setup();
    let mut ids = Vec::new();
    for n in 0..3 {
        fx.clock.advance(Duration::from_millis(10));
        ids.push(
            fx.dispatcher
                .queue_job(fx.room_id, &format!("user-{n}"), hello_code(), OptionsPatch::default())
                .unwrap(),
        );
    }
    for (rank, id) in ids.iter().enumerate() {
        assert_eq!(fx.dispatcher.job_status(id).unwrap().queue_position, Some(rank + 1));
    }
}

#[tokio::test]
async fn cleanup_purges_old_rows() {
    let fx = setup();
    let job_id = fx
        .dispatcher
        .queue_job(fx.room_id, "alice", hello_code(), OptionsPatch::default())
        .unwrap();
    drive_one(&fx).await;

    fx.clock.advance(Duration::from_secs(8 * 24 * 60 * 60));
    let (purged, deleted) = fx.dispatcher.cleanup().unwrap();
    assert_eq!(purged, 1);
    assert_eq!(deleted, 1);
    assert!(fx.dispatcher.job_status(&job_id).is_none());
}

#[tokio::test]
async fn worker_lanes_drain_the_queue() {
    let fx = setup();
    let mut ids = Vec::new();
    for n in 0..4 {
        ids.push(
            fx.dispatcher
                .queue_job(fx.room_id, &format!("user-{n}"), hello_code(), OptionsPatch::default())
                .unwrap(),
        );
    }

    let shutdown = CancellationToken::new();
    let handles = worker::spawn_workers(fx.dispatcher.clone(), shutdown.clone());

    // Poll until all jobs are terminal
    for _ in 0..100 {
        let done = ids
            .iter()
            .all(|id| fx.dispatcher.job_status(id).map(|s| s.state.is_terminal()).unwrap_or(false));
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    shutdown.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
    for id in &ids {
        assert_eq!(fx.dispatcher.job_status(id).unwrap().state, JobState::Completed);
    }
}

#[test]
fn backoff_doubles_per_attempt() {
    assert_eq!(worker::backoff_ms(1), 2_000);
    assert_eq!(worker::backoff_ms(2), 4_000);
    assert_eq!(worker::backoff_ms(3), 8_000);
}
