// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job record and lifecycle state machine.

use crate::clock::Clock;
use crate::command::CrawlCommand;
use crate::progress::JobProgress;
use serde::{Deserialize, Serialize};
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a job row.
    ///
    /// Stored as a plain string on [`Job`]; rows created by external
    /// admin surfaces may carry foreign id formats.
    pub struct JobId("job-");
}

/// Lifecycle status of a job.
///
/// `queued → running → {finished | failed}`; `failed → queued` (via
/// recovery or explicit reset) is the only backward edge; `paused` is a
/// side-state reachable from `queued`/`running` and returning to `queued`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Queued,
    Running,
    Finished,
    Failed,
    Paused,
}

crate::simple_display! {
    JobStatus {
        Queued => "queued",
        Running => "running",
        Finished => "finished",
        Failed => "failed",
        Paused => "paused",
    }
}

impl JobStatus {
    /// Whether the state machine permits `self → to`.
    pub fn can_transition(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Queued, Running)
                | (Queued, Paused)
                | (Running, Finished)
                | (Running, Failed)
                | (Running, Paused)
                | (Failed, Queued)
                | (Paused, Queued)
        )
    }

    /// Queued or running: a live claim on the job's uniqueness key.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Queued | JobStatus::Running)
    }

    /// Finished jobs never leave their state.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Finished)
    }
}

/// Rejected status transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid job transition: {from} -> {to}")]
pub struct InvalidTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

/// Uniqueness key for a job.
///
/// Path-scoped jobs are unique per (`full_path`, `branch`, `command`);
/// account-global jobs (no path, no branch) are unique per
/// (`command`, `account_id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobKey {
    Path { full_path: String, branch: Option<String>, command: CrawlCommand },
    Global { command: CrawlCommand, account_id: String },
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKey::Path { full_path, branch, command } => {
                write!(f, "{}@{}#{}", full_path, branch.as_deref().unwrap_or(""), command)
            }
            JobKey::Global { command, account_id } => {
                write!(f, "{}!{}", account_id, command)
            }
        }
    }
}

/// Inputs for creating a new job.
#[derive(Debug, Clone)]
pub struct JobDraft {
    pub id: String,
    pub command: CrawlCommand,
    pub account_id: String,
    pub full_path: Option<String>,
    pub branch: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub spawned_from: Option<String>,
}

impl JobDraft {
    pub fn builder(
        id: impl Into<String>,
        command: CrawlCommand,
        account_id: impl Into<String>,
    ) -> JobDraftBuilder {
        JobDraftBuilder {
            id: id.into(),
            command,
            account_id: account_id.into(),
            full_path: None,
            branch: None,
            from_ms: None,
            to_ms: None,
            spawned_from: None,
        }
    }
}

pub struct JobDraftBuilder {
    id: String,
    command: CrawlCommand,
    account_id: String,
    full_path: Option<String>,
    branch: Option<String>,
    from_ms: Option<i64>,
    to_ms: Option<i64>,
    spawned_from: Option<String>,
}

impl JobDraftBuilder {
    crate::setters! {
        option {
            full_path: String,
            branch: String,
            spawned_from: String,
            from_ms: i64,
            to_ms: i64,
        }
    }

    pub fn build(self) -> JobDraft {
        JobDraft {
            id: self.id,
            command: self.command,
            account_id: self.account_id,
            full_path: self.full_path,
            branch: self.branch,
            from_ms: self.from_ms,
            to_ms: self.to_ms,
            spawned_from: self.spawned_from,
        }
    }
}

/// One unit of crawl work for a given command, optionally scoped to an
/// area and branch.
///
/// Created by the job manager, mutated by the protocol path
/// (status/progress) and by recovery (status resets), never deleted by
/// the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub command: CrawlCommand,
    /// Null for account-global jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Optional crawl time window (epoch ms).
    #[serde(default, rename = "from", skip_serializing_if = "Option::is_none")]
    pub from_ms: Option<i64>,
    #[serde(default, rename = "to", skip_serializing_if = "Option::is_none")]
    pub to_ms: Option<i64>,
    /// Owning credential.
    pub account_id: String,
    /// Parent job whose completion caused this job to be created.
    /// A back-reference, not an ownership edge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spawned_from: Option<String>,
    /// Opaque crawler-defined cursor, persisted verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<serde_json::Value>,
    #[serde(default)]
    pub progress: JobProgress,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at_ms: Option<u64>,
}

impl Job {
    /// Create a new queued job.
    pub fn new(draft: JobDraft, clock: &impl Clock) -> Self {
        Self::new_with_epoch_ms(draft, clock.epoch_ms())
    }

    /// Create a new queued job with an explicit creation time.
    pub fn new_with_epoch_ms(draft: JobDraft, epoch_ms: u64) -> Self {
        Self {
            id: draft.id,
            status: JobStatus::Queued,
            command: draft.command,
            full_path: draft.full_path,
            branch: draft.branch,
            from_ms: draft.from_ms,
            to_ms: draft.to_ms,
            account_id: draft.account_id,
            spawned_from: draft.spawned_from,
            resume_state: None,
            progress: JobProgress::default(),
            created_at_ms: epoch_ms,
            updated_at_ms: epoch_ms,
            started_at_ms: None,
            finished_at_ms: None,
        }
    }

    /// The uniqueness key this job occupies.
    pub fn key(&self) -> JobKey {
        match &self.full_path {
            Some(path) => JobKey::Path {
                full_path: path.clone(),
                branch: self.branch.clone(),
                command: self.command,
            },
            None => JobKey::Global {
                command: self.command,
                account_id: self.account_id.clone(),
            },
        }
    }

    /// Apply a guarded status transition, stamping lifecycle timestamps.
    pub fn transition(&mut self, to: JobStatus, now_ms: u64) -> Result<(), InvalidTransition> {
        if !self.status.can_transition(to) {
            return Err(InvalidTransition { from: self.status, to });
        }
        match to {
            JobStatus::Running => self.started_at_ms = Some(now_ms),
            JobStatus::Finished | JobStatus::Failed => self.finished_at_ms = Some(now_ms),
            JobStatus::Queued => {}
            JobStatus::Paused => {}
        }
        self.status = to;
        self.updated_at_ms = now_ms;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

crate::builder! {
    pub struct JobBuilder => Job {
        into {
            id: String = "job-test-1",
            account_id: String = "acct-1",
        }
        set {
            status: JobStatus = JobStatus::Queued,
            command: CrawlCommand = CrawlCommand::Issues,
            progress: JobProgress = JobProgress::default(),
            created_at_ms: u64 = 1_770_000_000_000,
            updated_at_ms: u64 = 1_770_000_000_000,
        }
        option {
            full_path: String = Some("acme/widgets".to_string()),
            branch: String = None,
            from_ms: i64 = None,
            to_ms: i64 = None,
            spawned_from: String = None,
            resume_state: serde_json::Value = None,
            started_at_ms: u64 = None,
            finished_at_ms: u64 = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
