// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recovery sweeps over a seeded store, driven via the trigger surface.

use quarry_core::{Clock, CrawlCommand, FakeClock, Job, JobProgress, JobStatus};
use quarry_daemon::jobs::{JobRecovery, RecoveryConfig, RecoveryKind};
use quarry_storage::{JobStore, MemoryStore};
use std::sync::Arc;

const HOUR_MS: u64 = 60 * 60 * 1000;

fn world() -> (Arc<MemoryStore<FakeClock>>, JobRecovery<FakeClock>, FakeClock) {
    let clock = FakeClock::new();
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let recovery = JobRecovery::new(
        store.clone() as Arc<dyn JobStore>,
        clock.clone(),
        RecoveryConfig::default(),
    );
    (store, recovery, clock)
}

#[tokio::test]
async fn comprehensive_trigger_recovers_failed_and_stuck() {
    let (store, recovery, clock) = world();
    store.set_account_token("acct-1", "glpat-secret");
    let now = clock.epoch_ms();

    let retryable_failed = Job::builder()
        .id("job-failed")
        .full_path("acme/a")
        .status(JobStatus::Failed)
        .finished_at_ms(now)
        .progress(JobProgress {
            retryable: true,
            last_error: Some("gitlab returned 502".to_string()),
            ..Default::default()
        })
        .build();
    let stuck_running = Job::builder()
        .id("job-stuck")
        .full_path("acme/b")
        .command(CrawlCommand::Branches)
        .status(JobStatus::Running)
        .started_at_ms(now)
        .updated_at_ms(now)
        .build();
    let healthy_running = Job::builder()
        .id("job-live")
        .full_path("acme/c")
        .command(CrawlCommand::Commits)
        .status(JobStatus::Running)
        .started_at_ms(now)
        .updated_at_ms(now + 3 * HOUR_MS)
        .build();
    store
        .insert_jobs(vec![retryable_failed, stuck_running, healthy_running])
        .await
        .unwrap();

    clock.set_epoch_ms(now + 3 * HOUR_MS + 1);
    let response = recovery.handle_trigger(RecoveryKind::Comprehensive).await;

    assert!(response.success);
    assert_eq!(response.report.recovered, 2);
    assert_eq!(response.report.failed_recovery, 0);
    assert!(response.message.contains("recovered 2"));

    let recovered = store.get_job("job-failed").await.unwrap().unwrap();
    assert_eq!(recovered.status, JobStatus::Queued);
    assert!(!recovered.progress.retryable);
    assert_eq!(
        recovered.progress.recovery_attempt.as_ref().unwrap().previous_error.as_deref(),
        Some("gitlab returned 502")
    );

    let reset = store.get_job("job-stuck").await.unwrap().unwrap();
    assert_eq!(reset.status, JobStatus::Queued);
    assert_eq!(reset.progress.reset_reason.as_deref(), Some("stuck_job_recovery"));

    assert_eq!(store.get_job("job-live").await.unwrap().unwrap().status, JobStatus::Running);

    // A second sweep finds nothing left to do
    let second = recovery.handle_trigger(RecoveryKind::Comprehensive).await;
    assert_eq!(second.report.recovered, 0);
}

#[tokio::test]
async fn failed_only_trigger_leaves_stuck_jobs_alone() {
    let (store, recovery, clock) = world();
    store.set_account_token("acct-1", "glpat-secret");
    let now = clock.epoch_ms();

    store
        .insert_jobs(vec![
            Job::builder()
                .id("job-failed")
                .full_path("acme/a")
                .status(JobStatus::Failed)
                .progress(JobProgress { retryable: true, ..Default::default() })
                .build(),
            Job::builder()
                .id("job-stuck")
                .full_path("acme/b")
                .command(CrawlCommand::Branches)
                .status(JobStatus::Running)
                .updated_at_ms(now)
                .build(),
        ])
        .await
        .unwrap();

    clock.set_epoch_ms(now + 3 * HOUR_MS);
    let response = recovery.handle_trigger(RecoveryKind::Failed).await;
    assert_eq!(response.report.recovered, 1);
    assert_eq!(store.get_job("job-stuck").await.unwrap().unwrap().status, JobStatus::Running);

    let response = recovery.handle_trigger(RecoveryKind::Stuck).await;
    assert_eq!(response.report.recovered, 1);
    assert_eq!(store.get_job("job-stuck").await.unwrap().unwrap().status, JobStatus::Queued);
}
