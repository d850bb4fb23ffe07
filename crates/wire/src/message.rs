// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed message union for the crawler wire protocol.
//!
//! Every message carries `type`, an ISO-8601 `timestamp`, an optional
//! `job_id`, and a `data` payload whose shape is fixed per type.

use indexmap::IndexMap;
use quarry_core::{Area, CrawlCommand, EntityProgress, JobProgress, SystemStatus};
use serde::{Deserialize, Serialize};

/// One wire message: the envelope fields plus the type-tagged payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(flatten)]
    pub body: Body,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
}

impl Message {
    pub fn new(body: Body, timestamp: impl Into<String>) -> Self {
        Self { body, timestamp: timestamp.into(), job_id: None }
    }

    pub fn with_job_id(body: Body, timestamp: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self { body, timestamp: timestamp.into(), job_id: Some(job_id.into()) }
    }

    /// Wire name of the message type.
    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }

    /// Job-lifecycle messages require an authenticated connection and a
    /// `job_id`.
    pub fn is_job_scoped(&self) -> bool {
        matches!(
            self.body,
            Body::JobStarted(_) | Body::JobProgress(_) | Body::JobCompleted(_) | Body::JobFailed(_)
        )
    }
}

/// Type-tagged payload. Crawler→backend types first, then backend→crawler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Body {
    Heartbeat(HeartbeatData),
    JobStarted(JobStartedData),
    JobProgress(JobProgressData),
    JobCompleted(JobCompletedData),
    JobFailed(JobFailedData),
    TokenRefreshRequest(TokenRefreshRequestData),

    JobAssignment(JobAssignmentData),
    TokenRefreshResponse(TokenRefreshResponseData),
    Shutdown(ShutdownData),

    /// Catch-all for unrecognized type tags; rejected at validation.
    #[serde(other)]
    Unknown,
}

impl Body {
    pub fn kind(&self) -> &'static str {
        match self {
            Body::Heartbeat(_) => "heartbeat",
            Body::JobStarted(_) => "job_started",
            Body::JobProgress(_) => "job_progress",
            Body::JobCompleted(_) => "job_completed",
            Body::JobFailed(_) => "job_failed",
            Body::TokenRefreshRequest(_) => "token_refresh_request",
            Body::JobAssignment(_) => "job_assignment",
            Body::TokenRefreshResponse(_) => "token_refresh_response",
            Body::Shutdown(_) => "shutdown",
            Body::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatData {
    pub system_status: SystemStatus,
    /// Signed on the wire so a negative count is a validation error, not
    /// a decode failure.
    pub active_jobs: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobStartedData {
    /// True when the crawler resumed from a persisted cursor.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub resumed: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobProgressData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_completion: Option<f64>,
    #[serde(flatten)]
    pub progress: JobProgress,
    /// Opaque crawler cursor, persisted verbatim by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobCompletedData {
    /// Areas found by an area-discovery job; drives the dependent fan-out.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub discovered_areas: Vec<Area>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub entities: IndexMap<String, EntityProgress>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFailedData {
    pub error: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_progress: Option<JobProgress>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenRefreshRequestData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobAssignmentData {
    pub command: CrawlCommand,
    pub access_token: String,
    pub gitlab_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Cursor from the job's previous run, returned unchanged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_state: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRefreshResponseData {
    pub refresh_successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShutdownData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
