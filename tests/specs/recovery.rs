// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Duet Labs

//! Crash-recovery flow: journal replay and checkpoint restore across
//! process restarts.

use duet_core::{FakeClock, JobState, OptionsPatch};
use duet_sandbox::SandboxPool;
use duet_server::dispatch::{DispatchConfig, Dispatcher};
use duet_storage::{JobStore, Journal, QueueStore, RoomStore};
use std::sync::Arc;

struct NoopRunner;

#[async_trait::async_trait]
impl duet_sandbox::SandboxRunner for NoopRunner {
    async fn run(
        &self,
        _job_id: &duet_core::JobId,
        _code: &str,
        _options: &duet_core::ExecOptions,
    ) -> duet_core::ExecResult {
        duet_core::ExecResult { success: true, exit_code: Some(0), ..Default::default() }
    }
    async fn kill(&self, _job_id: &duet_core::JobId) {}
}

fn dispatcher_over(journal: Journal) -> Dispatcher<NoopRunner, FakeClock> {
    let clock = FakeClock::new();
    Dispatcher::new(
        JobStore::new(journal.clone(), clock.clone()),
        QueueStore::new(journal, clock.clone()),
        Arc::new(SandboxPool::new(NoopRunner, clock, 5)),
        DispatchConfig::default(),
    )
}

#[tokio::test]
async fn queued_jobs_survive_restart() {
    let dir = tempfile::tempdir().unwrap();

    let (room_id, job_id) = {
        let journal = Journal::open(dir.path()).unwrap();
        let rooms = RoomStore::new(journal.clone(), FakeClock::new());
        let dispatcher = dispatcher_over(journal);
        let room = rooms.create().unwrap();
        let job_id = dispatcher
            .queue_job(room.id, "alice", "int main() {}", OptionsPatch::default())
            .unwrap();
        (room.id, job_id)
        // journal dropped = process exit without checkpoint
    };

    // Restart: full journal replay rebuilds the queue and the job
    let journal = Journal::open(dir.path()).unwrap();
    let rooms = RoomStore::new(journal.clone(), FakeClock::new());
    let dispatcher = dispatcher_over(journal);

    assert!(rooms.find_by_id(&room_id).is_some());
    let status = dispatcher.job_status(&job_id).unwrap();
    assert_eq!(status.state, JobState::Queued);
    assert_eq!(status.queue_position, Some(1));

    // The revived queue still dispatches
    let item = dispatcher.queue.take_next("w0").unwrap().unwrap();
    assert_eq!(item.job_id, job_id);
}

#[tokio::test]
async fn checkpoint_plus_tail_replay_restores_everything() {
    let dir = tempfile::tempdir().unwrap();

    {
        let journal = Journal::open(dir.path()).unwrap();
        let rooms = RoomStore::new(journal.clone(), FakeClock::new());
        let before_checkpoint = rooms.create().unwrap();
        rooms
            .update_snapshot(&before_checkpoint.id, "checkpointed", None)
            .unwrap();
        journal.checkpoint().unwrap();

        let after_checkpoint = rooms.create().unwrap();
        rooms.update_snapshot(&after_checkpoint.id, "tail", None).unwrap();
    }

    let journal = Journal::open(dir.path()).unwrap();
    let contents: Vec<String> =
        journal.read(|s| s.rooms.values().map(|r| r.code_snapshot.clone()).collect());
    assert_eq!(contents.len(), 2);
    assert!(contents.contains(&"checkpointed".to_string()));
    assert!(contents.contains(&"tail".to_string()));
}

#[tokio::test]
async fn terminal_states_stay_terminal_across_restart() {
    let dir = tempfile::tempdir().unwrap();

    let job_id = {
        let journal = Journal::open(dir.path()).unwrap();
        let rooms = RoomStore::new(journal.clone(), FakeClock::new());
        let dispatcher = dispatcher_over(journal);
        let room = rooms.create().unwrap();
        let job_id = dispatcher
            .queue_job(room.id, "alice", "int main() {}", OptionsPatch::default())
            .unwrap();
        dispatcher.cancel_job(&job_id, "alice").unwrap();
        job_id
    };

    let journal = Journal::open(dir.path()).unwrap();
    let dispatcher = dispatcher_over(journal);
    assert_eq!(dispatcher.job_status(&job_id).unwrap().state, JobState::Cancelled);

    // A late completion write against the revived state is refused
    dispatcher
        .jobs
        .mark_completed(&job_id, "late", "", 0, 1, None)
        .unwrap();
    assert_eq!(dispatcher.job_status(&job_id).unwrap().state, JobState::Cancelled);
}
