// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The `JobStore` trait and its patch/filter types.

use async_trait::async_trait;
use quarry_core::{Area, CrawlCommand, Job, JobKey, JobProgress, JobStatus};
use thiserror::Error;

/// Errors surfaced by the persistence layer.
///
/// Never silently dropped for job-state-changing operations; callers
/// apply their own retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation failed: {0}")]
    Operation(String),
}

/// Progress update semantics for [`JobPatch`].
#[derive(Debug, Clone)]
pub enum ProgressPatch {
    /// Overwrite the stored progress (used by recovery, which owns the
    /// row for the duration of its guarded update).
    Replace(JobProgress),
    /// Merge an incoming report into the stored progress under the
    /// store's per-row atomicity (see `JobProgress::merge`).
    Merge(JobProgress),
}

/// Partial update applied atomically to one job row.
#[derive(Debug, Clone, Default)]
pub struct JobPatch {
    /// Apply only if the row's current status matches; otherwise the
    /// update affects zero rows. This is the store-level guard that makes
    /// recovery and discovery resets safe without an in-process lock.
    pub expect_status: Option<JobStatus>,
    pub status: Option<JobStatus>,
    pub set_started_at: Option<u64>,
    pub set_finished_at: Option<u64>,
    pub clear_started_at: bool,
    pub clear_finished_at: bool,
    pub progress: Option<ProgressPatch>,
    pub resume_state: Option<serde_json::Value>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    quarry_core::setters! {
        option {
            expect_status: JobStatus,
            set_started_at: u64,
            set_finished_at: u64,
            progress: ProgressPatch,
            resume_state: serde_json::Value,
        }
    }

    pub fn clear_started_at(mut self) -> Self {
        self.clear_started_at = true;
        self
    }

    pub fn clear_finished_at(mut self) -> Self {
        self.clear_finished_at = true;
        self
    }
}

/// Predicate for `find_jobs`. All present fields must match.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub command: Option<CrawlCommand>,
    pub account_id: Option<String>,
    pub full_path: Option<String>,
    /// Only jobs whose `updated_at_ms` is strictly older than this.
    pub updated_before_ms: Option<u64>,
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn with_status(status: JobStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }

    pub fn matches(&self, job: &Job) -> bool {
        if let Some(status) = self.status {
            if job.status != status {
                return false;
            }
        }
        if let Some(command) = self.command {
            if job.command != command {
                return false;
            }
        }
        if let Some(ref account_id) = self.account_id {
            if &job.account_id != account_id {
                return false;
            }
        }
        if let Some(ref full_path) = self.full_path {
            if job.full_path.as_deref() != Some(full_path.as_str()) {
                return false;
            }
        }
        if let Some(before) = self.updated_before_ms {
            if job.updated_at_ms >= before {
                return false;
            }
        }
        true
    }
}

/// Persistence seam for the coordination core.
///
/// Every call is transactionally consistent on its own: `update_job`
/// applies its whole patch against the row's current state or not at all.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Look up the job occupying a uniqueness key, if any.
    async fn find_job(&self, key: &JobKey) -> Result<Option<Job>, StoreError>;

    /// Look up a job by id.
    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError>;

    /// Insert jobs, ignoring any whose uniqueness key is already
    /// occupied. Returns the number actually inserted.
    async fn insert_jobs(&self, jobs: Vec<Job>) -> Result<usize, StoreError>;

    /// Apply a patch to one row. Returns the number of rows affected
    /// (0 when the job is missing or `expect_status` does not match).
    async fn update_job(&self, id: &str, patch: JobPatch) -> Result<usize, StoreError>;

    async fn find_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError>;

    /// Insert-or-ignore areas keyed by `full_path`. Returns the number
    /// actually inserted.
    async fn upsert_areas(&self, areas: Vec<Area>) -> Result<usize, StoreError>;

    /// Usable access token for an account, if one exists.
    async fn find_account_token(&self, account_id: &str) -> Result<Option<String>, StoreError>;
}
