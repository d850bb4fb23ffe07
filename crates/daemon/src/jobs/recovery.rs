// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Periodic recovery of failed-but-retryable and stuck jobs.
//!
//! Sweeps are batch-bounded and infallible at their boundary: store
//! errors are aggregated into the report, logged, and never abort the
//! schedule or the process. Recovery may overlap live protocol updates
//! on the same rows; every reset is guarded by `expect_status`, and the
//! residual race (a recovered job vs a fresh completion) is an accepted
//! last-write at the row level.

use quarry_core::{Clock, JobStatus, RecoveryStamp, TimelineEvent};
use quarry_storage::{JobFilter, JobPatch, JobStore, ProgressPatch};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Stamped into `progress.reset_reason` by the stuck-job pass.
pub const STUCK_JOB_REASON: &str = "stuck_job_recovery";

/// Error fragments that mark a failure as transient even without the
/// retryable flag (credential problems, a since-fixed mapping bug).
const TRANSIENT_ERROR_MARKERS: &[&str] =
    &["missing credential", "expired token", "401 unauthorized", "unknown field mapping"];

fn is_transient(error: Option<&str>) -> bool {
    let Some(error) = error else {
        return false;
    };
    let lowered = error.to_lowercase();
    TRANSIENT_ERROR_MARKERS.iter().any(|marker| lowered.contains(marker))
}

#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Failed-job recovery batch bound.
    pub failed_batch: usize,
    /// Stuck-job reset batch bound.
    pub stuck_batch: usize,
    /// Running jobs untouched for this long are presumed orphaned.
    pub stuck_after: Duration,
    /// Sweep cadence.
    pub interval: Duration,
    /// Delay before the first sweep (persistence readiness).
    pub startup_grace: Duration,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            failed_batch: 50,
            stuck_batch: 20,
            stuck_after: Duration::from_secs(2 * 60 * 60),
            interval: Duration::from_secs(30 * 60),
            startup_grace: Duration::from_secs(10),
        }
    }
}

/// Result record for one sweep (or the comprehensive sum).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub recovered: usize,
    pub failed_recovery: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

impl RecoveryReport {
    pub fn absorb(&mut self, other: RecoveryReport) {
        self.recovered += other.recovered;
        self.failed_recovery += other.failed_recovery;
        self.skipped += other.skipped;
        self.errors.extend(other.errors);
    }
}

/// Admin trigger surface request kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryKind {
    Comprehensive,
    Failed,
    Stuck,
}

/// Structured trigger result; never throws past the boundary.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryResponse {
    pub success: bool,
    pub message: String,
    pub report: RecoveryReport,
}

/// Read-only description of the available trigger types.
pub fn recovery_kinds() -> &'static [(&'static str, &'static str)] {
    &[
        ("comprehensive", "run the failed-job and stuck-job passes and sum the results"),
        ("failed", "reset failed jobs that are retryable or failed transiently"),
        ("stuck", "reset running jobs untouched for the staleness window"),
    ]
}

pub struct JobRecovery<C: Clock> {
    store: Arc<dyn JobStore>,
    clock: C,
    config: RecoveryConfig,
}

impl<C: Clock> JobRecovery<C> {
    pub fn new(store: Arc<dyn JobStore>, clock: C, config: RecoveryConfig) -> Self {
        Self { store, clock, config }
    }

    /// Failed-job pass: reset retryable or transiently-failed jobs whose
    /// account still has a usable token. Clears the retryable flag so a
    /// later sweep cannot loop on the same job.
    pub async fn recover_failed(&self) -> RecoveryReport {
        let now_ms = self.clock.epoch_ms();
        let mut report = RecoveryReport::default();

        let failed = match self.store.find_jobs(&JobFilter::with_status(JobStatus::Failed)).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "failed-job sweep could not list candidates");
                report.errors.push(format!("list failed jobs: {e}"));
                return report;
            }
        };

        let candidates = failed
            .into_iter()
            .filter(|job| {
                job.progress.retryable || is_transient(job.progress.last_error.as_deref())
            })
            .take(self.config.failed_batch);

        for job in candidates {
            let token = match self.store.find_account_token(&job.account_id).await {
                Ok(token) => token,
                Err(e) => {
                    report.failed_recovery += 1;
                    report.errors.push(format!("{}: token lookup: {e}", job.id));
                    continue;
                }
            };
            if token.is_none() {
                info!(job_id = %job.id, account_id = %job.account_id, "skipping recovery: no usable token");
                report.skipped += 1;
                continue;
            }

            let mut progress = job.progress.clone();
            let previous_error = progress.last_error.clone();
            // One automatic recovery per flag: clear it so the next sweep
            // cannot loop on this job
            progress.retryable = false;
            progress.recovery_attempt =
                Some(RecoveryStamp { at_ms: now_ms, previous_error: previous_error.clone() });
            progress.push_timeline(TimelineEvent::with_detail(
                now_ms,
                "recovered",
                previous_error.unwrap_or_default(),
            ));

            let patch = JobPatch::status(JobStatus::Queued)
                .expect_status(JobStatus::Failed)
                .clear_finished_at()
                .progress(ProgressPatch::Replace(progress));

            match self.store.update_job(&job.id, patch).await {
                Ok(1) => {
                    info!(job_id = %job.id, "failed job recovered to queued");
                    report.recovered += 1;
                }
                // Raced with a live update; the row is no longer failed
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.failed_recovery += 1;
                    report.errors.push(format!("{}: {e}", job.id));
                }
            }
        }
        report
    }

    /// Stuck-job pass: running jobs whose `updated_at` is older than the
    /// staleness window are presumed orphaned by a crashed worker.
    pub async fn reset_stuck(&self) -> RecoveryReport {
        let now_ms = self.clock.epoch_ms();
        let cutoff = now_ms.saturating_sub(self.config.stuck_after.as_millis() as u64);
        let mut report = RecoveryReport::default();

        let filter = JobFilter {
            status: Some(JobStatus::Running),
            updated_before_ms: Some(cutoff),
            limit: Some(self.config.stuck_batch),
            ..JobFilter::default()
        };
        let stuck = match self.store.find_jobs(&filter).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "stuck-job sweep could not list candidates");
                report.errors.push(format!("list stuck jobs: {e}"));
                return report;
            }
        };

        for job in stuck {
            let mut progress = job.progress.clone();
            progress.reset_reason = Some(STUCK_JOB_REASON.to_string());
            progress.push_timeline(TimelineEvent::with_detail(now_ms, "reset", STUCK_JOB_REASON));

            let patch = JobPatch::status(JobStatus::Queued)
                .expect_status(JobStatus::Running)
                .clear_started_at()
                .progress(ProgressPatch::Replace(progress));

            match self.store.update_job(&job.id, patch).await {
                Ok(1) => {
                    info!(job_id = %job.id, "stuck job reset to queued");
                    report.recovered += 1;
                }
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    report.failed_recovery += 1;
                    report.errors.push(format!("{}: {e}", job.id));
                }
            }
        }
        report
    }

    /// Run both passes and sum the results.
    pub async fn comprehensive(&self) -> RecoveryReport {
        let mut report = self.recover_failed().await;
        report.absorb(self.reset_stuck().await);
        report
    }

    /// Admin trigger surface: structured result, no errors past the
    /// boundary.
    pub async fn handle_trigger(&self, kind: RecoveryKind) -> RecoveryResponse {
        let report = match kind {
            RecoveryKind::Comprehensive => self.comprehensive().await,
            RecoveryKind::Failed => self.recover_failed().await,
            RecoveryKind::Stuck => self.reset_stuck().await,
        };
        let message = format!(
            "recovered {}, failed {}, skipped {}",
            report.recovered, report.failed_recovery, report.skipped
        );
        RecoveryResponse { success: report.errors.is_empty(), message, report }
    }

    /// Run once after the startup grace delay, then on the configured
    /// interval until cancelled. Sweep errors are already contained in
    /// the report; nothing here can abort the schedule.
    pub fn start(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()>
    where
        C: 'static,
    {
        let recovery = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(recovery.config.startup_grace) => {}
            }
            loop {
                let report = recovery.comprehensive().await;
                info!(
                    recovered = report.recovered,
                    failed = report.failed_recovery,
                    skipped = report.skipped,
                    errors = report.errors.len(),
                    "recovery sweep finished"
                );
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("recovery schedule stopping");
                        return;
                    }
                    _ = tokio::time::sleep(recovery.config.interval) => {}
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
