// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applies incremental progress reports to persisted job state.
//!
//! Merging happens inside the store's per-row atomic update, not under an
//! in-process lock: multiple backend instances may share one store, and
//! per-row atomicity is what serializes a job's own writes.

use quarry_core::Clock;
use quarry_storage::{JobPatch, JobStore, ProgressPatch, StoreError};
use quarry_wire::JobProgressData;
use std::sync::Arc;
use tracing::warn;

pub struct ProgressTracker<C: Clock> {
    store: Arc<dyn JobStore>,
    clock: C,
}

impl<C: Clock> ProgressTracker<C> {
    pub fn new(store: Arc<dyn JobStore>, clock: C) -> Self {
        Self { store, clock }
    }

    /// Merge one `job_progress` report into the job row. The resume
    /// cursor is stored verbatim; completion percentage stays derived.
    pub async fn apply(&self, job_id: &str, data: &JobProgressData) -> Result<bool, StoreError> {
        let mut patch = JobPatch::default().progress(ProgressPatch::Merge(data.progress.clone()));
        if let Some(ref resume_state) = data.resume_state {
            patch = patch.resume_state(resume_state.clone());
        }

        let affected = self.store.update_job(job_id, patch).await?;
        if affected == 0 {
            warn!(
                job_id,
                at_ms = self.clock.epoch_ms(),
                "progress report for unknown job dropped"
            );
        }
        Ok(affected == 1)
    }
}

#[cfg(test)]
#[path = "progress_tests.rs"]
mod tests;
