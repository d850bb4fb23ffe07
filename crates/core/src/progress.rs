// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structured job progress and the report-merge semantics.
//!
//! Progress reports from crawlers are incremental, not snapshots: merging
//! must never make progress appear to regress, per-type item counts are
//! additive, and totals may legitimately be revised as discovery
//! continues.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Maximum number of timeline entries retained per job.
pub const TIMELINE_CAP: usize = 50;

/// One timeline entry (stage change, error, recovery stamp, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub at_ms: u64,
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TimelineEvent {
    pub fn new(at_ms: u64, event: impl Into<String>) -> Self {
        Self { at_ms, event: event.into(), detail: None }
    }

    pub fn with_detail(at_ms: u64, event: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { at_ms, event: event.into(), detail: Some(detail.into()) }
    }
}

/// Per-entity progress counters (e.g. "issues", "merge_requests").
///
/// Invariant (enforced at message validation): `total_processed` never
/// exceeds `total_discovered`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityProgress {
    #[serde(default)]
    pub total_discovered: u64,
    #[serde(default)]
    pub total_processed: u64,
}

/// Stamp left on a job by the failed-job recovery sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryStamp {
    pub at_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_error: Option<String>,
}

/// Structured progress state persisted on a job.
///
/// The legacy field names `processed`/`total` are accepted on input;
/// canonical names are always written on output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobProgress {
    #[serde(default, alias = "processed")]
    pub processed_items: u64,
    #[serde(default, alias = "total", skip_serializing_if = "Option::is_none")]
    pub total_items: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub items_by_type: IndexMap<String, u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub timeline: Vec<TimelineEvent>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub entities: IndexMap<String, EntityProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Marks a failed job as eligible for automatic recovery exactly once.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_attempt: Option<RecoveryStamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_reason: Option<String>,
}

impl JobProgress {
    /// Merge an incoming report into this progress state.
    ///
    /// - processed counters: `max(existing, incoming)`
    /// - totals: replaced by the incoming value when present
    /// - `items_by_type`: summed
    /// - timeline: appended, bounded ring of [`TIMELINE_CAP`]
    /// - entities: discovered replaced, processed maxed, keys unioned
    pub fn merge(&self, incoming: &JobProgress) -> JobProgress {
        let mut items_by_type = self.items_by_type.clone();
        for (kind, count) in &incoming.items_by_type {
            *items_by_type.entry(kind.clone()).or_insert(0) += count;
        }

        let mut entities = self.entities.clone();
        for (name, report) in &incoming.entities {
            let entry = entities.entry(name.clone()).or_default();
            entry.total_discovered = report.total_discovered;
            entry.total_processed = entry.total_processed.max(report.total_processed);
        }

        let mut timeline = self.timeline.clone();
        timeline.extend(incoming.timeline.iter().cloned());
        if timeline.len() > TIMELINE_CAP {
            timeline.drain(..timeline.len() - TIMELINE_CAP);
        }

        JobProgress {
            processed_items: self.processed_items.max(incoming.processed_items),
            total_items: incoming.total_items.or(self.total_items),
            stage: incoming.stage.clone().or_else(|| self.stage.clone()),
            items_by_type,
            timeline,
            entities,
            last_error: incoming.last_error.clone().or_else(|| self.last_error.clone()),
            retryable: self.retryable || incoming.retryable,
            recovery_attempt: incoming
                .recovery_attempt
                .clone()
                .or_else(|| self.recovery_attempt.clone()),
            reset_reason: incoming.reset_reason.clone().or_else(|| self.reset_reason.clone()),
        }
    }

    /// Append a timeline entry, discarding the oldest beyond the cap.
    pub fn push_timeline(&mut self, event: TimelineEvent) {
        self.timeline.push(event);
        if self.timeline.len() > TIMELINE_CAP {
            let excess = self.timeline.len() - TIMELINE_CAP;
            self.timeline.drain(..excess);
        }
    }

    /// Derived completion percentage: `min(100, round(processed/total*100))`
    /// when a positive total is known, else `None`.
    pub fn completion_percent(&self) -> Option<u8> {
        match self.total_items {
            Some(total) if total > 0 => {
                let pct = (self.processed_items as f64 / total as f64 * 100.0).round();
                Some(pct.min(100.0) as u8)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
