// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle transitions and dependency-driven spawning.
//!
//! Spawning is idempotent end to end: area upserts are insert-or-ignore,
//! and dependent jobs are created only when their uniqueness key has no
//! queued or running occupant. Spawn failures become incidents, never
//! errors for the caller: one broken spawn must not block unrelated
//! jobs.

use parking_lot::Mutex;
use quarry_core::{
    Area, Clock, CrawlCommand, Incident, Job, JobDraft, JobId, JobKey, JobProgress, JobStatus,
    TimelineEvent,
};
use quarry_storage::{JobPatch, JobStore, ProgressPatch, StoreError};
use quarry_wire::{Body, JobAssignmentData, JobCompletedData, JobFailedData, Message};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// A finished discovery younger than this suppresses a new discovery run
/// for the same account (48 hours).
pub const DISCOVERY_COOLDOWN_MS: u64 = 48 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What `ensure_job` did for one uniqueness key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    Created,
    /// An existing failed row was reset to queued and reused.
    Reset,
    /// The key already has a live (or finished) occupant.
    Skipped,
}

/// Outcome of requesting a discovery run for an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Created(String),
    /// An old discovery row was reset and reused.
    Reset(String),
    /// A discovery job is already queued or running.
    AlreadyPending,
    /// A discovery finished within the cooldown window.
    RateLimited,
}

/// Aggregate result of a discovery-completion fan-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SpawnSummary {
    pub areas_inserted: usize,
    pub jobs_created: usize,
    pub jobs_reset: usize,
    pub jobs_skipped: usize,
    pub incidents: usize,
}

pub struct JobManager<C: Clock> {
    store: Arc<dyn JobStore>,
    clock: C,
    incidents: Mutex<Vec<Incident>>,
}

impl<C: Clock> JobManager<C> {
    pub fn new(store: Arc<dyn JobStore>, clock: C) -> Self {
        Self { store, clock, incidents: Mutex::new(Vec::new()) }
    }

    /// Create a queued job, unless its uniqueness key is occupied.
    pub async fn create_job(&self, draft: JobDraft) -> Result<Option<Job>, ManagerError> {
        let job = Job::new(draft, &self.clock);
        let inserted = self.store.insert_jobs(vec![job.clone()]).await?;
        Ok((inserted == 1).then_some(job))
    }

    /// Insert if the key is absent, reset if its occupant failed,
    /// otherwise leave the occupant alone.
    pub async fn ensure_job(&self, draft: JobDraft) -> Result<SpawnOutcome, ManagerError> {
        let key = draft_key(&draft);
        match self.store.find_job(&key).await? {
            None => match self.create_job(draft).await? {
                Some(_) => Ok(SpawnOutcome::Created),
                // Lost a concurrent insert race; the other writer's row wins
                None => Ok(SpawnOutcome::Skipped),
            },
            Some(existing) if existing.status == JobStatus::Failed => {
                let affected = self.requeue(&existing.id, JobStatus::Failed, "requeued").await?;
                Ok(if affected == 1 { SpawnOutcome::Reset } else { SpawnOutcome::Skipped })
            }
            Some(_) => Ok(SpawnOutcome::Skipped),
        }
    }

    /// Handle `job_started`: queued → running.
    pub async fn mark_started(&self, job_id: &str) -> Result<bool, ManagerError> {
        let now_ms = self.clock.epoch_ms();
        let patch = JobPatch::status(JobStatus::Running)
            .expect_status(JobStatus::Queued)
            .set_started_at(now_ms)
            .progress(ProgressPatch::Merge(timeline_only(TimelineEvent::new(now_ms, "started"))));
        let affected = self.store.update_job(job_id, patch).await?;
        if affected == 0 {
            warn!(job_id, "job_started for a job that is not queued; ignoring");
        }
        Ok(affected == 1)
    }

    /// Handle `job_completed`: running → finished, then the dependent
    /// fan-out when the finished job was an area discovery.
    pub async fn complete_job(
        &self,
        job_id: &str,
        data: &JobCompletedData,
    ) -> Result<SpawnSummary, ManagerError> {
        let now_ms = self.clock.epoch_ms();
        let Some(job) = self.store.get_job(job_id).await? else {
            warn!(job_id, "job_completed for unknown job");
            return Ok(SpawnSummary::default());
        };

        let mut incoming = data.final_progress.clone().unwrap_or_default();
        for (entity, counts) in &data.entities {
            incoming.entities.insert(entity.clone(), *counts);
        }
        incoming.push_timeline(TimelineEvent::new(now_ms, "completed"));

        let patch = JobPatch::status(JobStatus::Finished)
            .expect_status(JobStatus::Running)
            .set_finished_at(now_ms)
            .progress(ProgressPatch::Merge(incoming));
        let affected = self.store.update_job(job_id, patch).await?;
        if affected == 0 {
            // Duplicate or stale completion; the fan-out below is
            // idempotent, so running it again is harmless
            warn!(job_id, status = %job.status, "job_completed for a job that is not running");
        }

        if job.command == CrawlCommand::AreaDiscovery && !data.discovered_areas.is_empty() {
            info!(
                job_id,
                account_id = %job.account_id,
                areas = data.discovered_areas.len(),
                "discovery completed, spawning dependent jobs"
            );
            return Ok(self
                .handle_discovery_completed(&job.account_id, job_id, &data.discovered_areas)
                .await);
        }
        Ok(SpawnSummary::default())
    }

    /// Handle `job_failed`: running → failed, recording the error and the
    /// crawler's retryable flag.
    pub async fn fail_job(&self, job_id: &str, data: &JobFailedData) -> Result<bool, ManagerError> {
        let now_ms = self.clock.epoch_ms();
        let mut incoming = data.final_progress.clone().unwrap_or_default();
        incoming.last_error = Some(data.error.clone());
        incoming.retryable = incoming.retryable || data.retryable;
        incoming.push_timeline(TimelineEvent::with_detail(now_ms, "failed", data.error.clone()));

        let patch = JobPatch::status(JobStatus::Failed)
            .expect_status(JobStatus::Running)
            .set_finished_at(now_ms)
            .progress(ProgressPatch::Merge(incoming));
        let affected = self.store.update_job(job_id, patch).await?;
        if affected == 0 {
            warn!(job_id, error = %data.error, "job_failed for a job that is not running");
        }
        Ok(affected == 1)
    }

    /// Pause from queued or running.
    pub async fn pause_job(&self, job_id: &str) -> Result<bool, ManagerError> {
        for from in [JobStatus::Running, JobStatus::Queued] {
            let patch = JobPatch::status(JobStatus::Paused).expect_status(from);
            if self.store.update_job(job_id, patch).await? == 1 {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Return a paused job to the queue.
    pub async fn resume_job(&self, job_id: &str) -> Result<bool, ManagerError> {
        let patch = JobPatch::status(JobStatus::Queued).expect_status(JobStatus::Paused);
        Ok(self.store.update_job(job_id, patch).await? == 1)
    }

    /// Idempotent fan-out for a completed area discovery: upsert areas,
    /// then ensure one dependent job per (area, command) and the
    /// account-global set. Errors become incidents; the flow continues.
    pub async fn handle_discovery_completed(
        &self,
        account_id: &str,
        spawned_from: &str,
        areas: &[Area],
    ) -> SpawnSummary {
        let mut summary = SpawnSummary::default();

        match self.store.upsert_areas(areas.to_vec()).await {
            Ok(inserted) => summary.areas_inserted = inserted,
            Err(e) => self.record_incident(
                &mut summary,
                &e.to_string(),
                serde_json::json!({ "account_id": account_id, "areas": areas.len() }),
            ),
        }

        for area in areas {
            for command in CrawlCommand::for_area(area.kind) {
                let draft = JobDraft::builder(JobId::generate().to_string(), *command, account_id)
                    .full_path(area.full_path.as_str())
                    .spawned_from(spawned_from)
                    .build();
                self.apply_spawn(&mut summary, draft, area.full_path.as_str()).await;
            }
        }

        for command in CrawlCommand::account_globals() {
            let draft = JobDraft::builder(JobId::generate().to_string(), *command, account_id)
                .spawned_from(spawned_from)
                .build();
            self.apply_spawn(&mut summary, draft, "<account-global>").await;
        }

        info!(
            account_id,
            spawned_from,
            created = summary.jobs_created,
            reset = summary.jobs_reset,
            skipped = summary.jobs_skipped,
            incidents = summary.incidents,
            "discovery fan-out complete"
        );
        summary
    }

    /// Request a discovery run for an account, honoring the cooldown.
    pub async fn ensure_discovery_job(&self, account_id: &str) -> Result<DiscoveryOutcome, ManagerError> {
        let key = JobKey::Global {
            command: CrawlCommand::AreaDiscovery,
            account_id: account_id.to_string(),
        };
        let now_ms = self.clock.epoch_ms();

        match self.store.find_job(&key).await? {
            None => {
                let draft = JobDraft::builder(
                    JobId::generate().to_string(),
                    CrawlCommand::AreaDiscovery,
                    account_id,
                )
                .build();
                match self.create_job(draft).await? {
                    Some(job) => Ok(DiscoveryOutcome::Created(job.id)),
                    None => Ok(DiscoveryOutcome::AlreadyPending),
                }
            }
            Some(existing) => match existing.status {
                JobStatus::Queued | JobStatus::Running | JobStatus::Paused => {
                    Ok(DiscoveryOutcome::AlreadyPending)
                }
                JobStatus::Finished => {
                    let fresh = existing
                        .finished_at_ms
                        .is_some_and(|at| now_ms.saturating_sub(at) < DISCOVERY_COOLDOWN_MS);
                    if fresh {
                        return Ok(DiscoveryOutcome::RateLimited);
                    }
                    // Reuse the finished row instead of duplicating: this
                    // is the rate-limited refresh path, not a normal
                    // state-machine edge
                    let affected =
                        self.requeue(&existing.id, JobStatus::Finished, "discovery_requeued").await?;
                    Ok(if affected == 1 {
                        DiscoveryOutcome::Reset(existing.id)
                    } else {
                        DiscoveryOutcome::AlreadyPending
                    })
                }
                JobStatus::Failed => {
                    let affected =
                        self.requeue(&existing.id, JobStatus::Failed, "discovery_requeued").await?;
                    Ok(if affected == 1 {
                        DiscoveryOutcome::Reset(existing.id)
                    } else {
                        DiscoveryOutcome::AlreadyPending
                    })
                }
            },
        }
    }

    /// Build a validated-ready `job_assignment` for dispatching a job to
    /// a worker.
    pub fn build_assignment(&self, job: &Job, access_token: &str, gitlab_host: &str) -> Message {
        let endpoint = format!("{}/api/graphql", gitlab_host.trim_end_matches('/'));
        Message::with_job_id(
            Body::JobAssignment(JobAssignmentData {
                command: job.command,
                access_token: access_token.to_string(),
                gitlab_host: gitlab_host.to_string(),
                graphql_endpoint: Some(endpoint),
                full_path: job.full_path.clone(),
                branch: job.branch.clone(),
                resume_state: job.resume_state.clone(),
            }),
            self.clock.timestamp(),
            job.id.clone(),
        )
    }

    /// Incidents captured since startup (ops surface).
    pub fn incidents(&self) -> Vec<Incident> {
        self.incidents.lock().clone()
    }

    async fn apply_spawn(&self, summary: &mut SpawnSummary, draft: JobDraft, context: &str) {
        let command = draft.command;
        match self.ensure_job(draft).await {
            Ok(SpawnOutcome::Created) => summary.jobs_created += 1,
            Ok(SpawnOutcome::Reset) => summary.jobs_reset += 1,
            Ok(SpawnOutcome::Skipped) => summary.jobs_skipped += 1,
            Err(e) => self.record_incident(
                summary,
                &e.to_string(),
                serde_json::json!({ "target": context, "command": command.to_string() }),
            ),
        }
    }

    async fn requeue(&self, job_id: &str, expect: JobStatus, event: &str) -> Result<usize, ManagerError> {
        let now_ms = self.clock.epoch_ms();
        let patch = JobPatch::status(JobStatus::Queued)
            .expect_status(expect)
            .clear_finished_at()
            .progress(ProgressPatch::Merge(timeline_only(TimelineEvent::new(now_ms, event))));
        Ok(self.store.update_job(job_id, patch).await?)
    }

    fn record_incident(&self, summary: &mut SpawnSummary, error: &str, context: serde_json::Value) {
        let incident = Incident::capture(error, context, self.clock.epoch_ms());
        error!(
            incident_id = %incident.id,
            error = %incident.error,
            context = %incident.context,
            "spawn failure captured as incident"
        );
        summary.incidents += 1;
        self.incidents.lock().push(incident);
    }
}

fn draft_key(draft: &JobDraft) -> JobKey {
    match &draft.full_path {
        Some(path) => JobKey::Path {
            full_path: path.clone(),
            branch: draft.branch.clone(),
            command: draft.command,
        },
        None => JobKey::Global { command: draft.command, account_id: draft.account_id.clone() },
    }
}

fn timeline_only(event: TimelineEvent) -> JobProgress {
    JobProgress { timeline: vec![event], ..JobProgress::default() }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
