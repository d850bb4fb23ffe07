// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::strategies::*;
use crate::FakeClock;
use proptest::prelude::*;

fn draft(id: &str) -> JobDraft {
    JobDraft::builder(id, CrawlCommand::Issues, "acct-1")
        .full_path("acme/widgets")
        .build()
}

#[test]
fn job_creation_is_queued() {
    let clock = FakeClock::new();
    let job = Job::new(draft("job-1"), &clock);

    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.created_at_ms, clock.epoch_ms());
    assert_eq!(job.updated_at_ms, clock.epoch_ms());
    assert!(job.started_at_ms.is_none());
    assert!(job.finished_at_ms.is_none());
    assert!(job.resume_state.is_none());
}

#[test]
fn path_scoped_key() {
    let clock = FakeClock::new();
    let job = Job::new(
        JobDraft::builder("job-1", CrawlCommand::Branches, "acct-1")
            .full_path("acme/widgets")
            .branch("main")
            .build(),
        &clock,
    );

    assert_eq!(
        job.key(),
        JobKey::Path {
            full_path: "acme/widgets".to_string(),
            branch: Some("main".to_string()),
            command: CrawlCommand::Branches,
        }
    );
}

#[test]
fn global_key_when_no_path() {
    let clock = FakeClock::new();
    let job = Job::new(JobDraft::builder("job-1", CrawlCommand::Users, "acct-7").build(), &clock);

    assert_eq!(
        job.key(),
        JobKey::Global { command: CrawlCommand::Users, account_id: "acct-7".to_string() }
    );
}

#[test]
fn transition_stamps_timestamps() {
    let clock = FakeClock::new();
    let mut job = Job::new(draft("job-1"), &clock);

    job.transition(JobStatus::Running, 100).unwrap();
    assert_eq!(job.started_at_ms, Some(100));
    assert_eq!(job.updated_at_ms, 100);

    job.transition(JobStatus::Finished, 200).unwrap();
    assert_eq!(job.finished_at_ms, Some(200));
    assert_eq!(job.updated_at_ms, 200);
}

#[test]
fn failed_to_queued_is_the_only_backward_edge() {
    assert!(JobStatus::Failed.can_transition(JobStatus::Queued));
    assert!(!JobStatus::Finished.can_transition(JobStatus::Queued));
    assert!(!JobStatus::Finished.can_transition(JobStatus::Running));
    assert!(!JobStatus::Failed.can_transition(JobStatus::Running));
}

#[test]
fn paused_returns_to_queued() {
    assert!(JobStatus::Queued.can_transition(JobStatus::Paused));
    assert!(JobStatus::Running.can_transition(JobStatus::Paused));
    assert!(JobStatus::Paused.can_transition(JobStatus::Queued));
    assert!(!JobStatus::Paused.can_transition(JobStatus::Running));
}

#[test]
fn invalid_transition_is_rejected() {
    let clock = FakeClock::new();
    let mut job = Job::new(draft("job-1"), &clock);

    let err = job.transition(JobStatus::Finished, 100).unwrap_err();
    assert_eq!(err, InvalidTransition { from: JobStatus::Queued, to: JobStatus::Finished });
    // Rejected transition leaves the job untouched
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.finished_at_ms.is_none());
}

#[yare::parameterized(
    queued   = { JobStatus::Queued,   true },
    running  = { JobStatus::Running,  true },
    finished = { JobStatus::Finished, false },
    failed   = { JobStatus::Failed,   false },
    paused   = { JobStatus::Paused,   false },
)]
fn active_iff_queued_or_running(status: JobStatus, expected: bool) {
    assert_eq!(status.is_active(), expected);
}

#[test]
fn job_serde_round_trip() {
    let job = Job::builder()
        .status(JobStatus::Running)
        .branch("main")
        .started_at_ms(1_770_000_000_100_u64)
        .resume_state(serde_json::json!({"cursor": "abc"}))
        .build();

    let json = serde_json::to_string(&job).expect("serialize job");
    let restored: Job = serde_json::from_str(&json).expect("deserialize job");

    assert_eq!(restored, job);
}

#[test]
fn time_window_serializes_with_legacy_names() {
    let job = Job::builder().from_ms(1000_i64).to_ms(2000_i64).build();
    let value = serde_json::to_value(&job).unwrap();

    assert_eq!(value["from"], 1000);
    assert_eq!(value["to"], 2000);
}

proptest! {
    #[test]
    fn status_serde_roundtrip(status in arb_job_status()) {
        let json = serde_json::to_string(&status).unwrap();
        let parsed: JobStatus = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(status, parsed);
    }

    #[test]
    fn no_transition_escapes_finished(status in arb_job_status()) {
        prop_assert!(!JobStatus::Finished.can_transition(status));
    }
}
