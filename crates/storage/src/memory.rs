// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory `JobStore` for tests and single-node runs.
//!
//! Honors the same uniqueness constraints a relational schema would:
//! insert-or-ignore on job keys and area paths, per-row atomic patches
//! under one lock (the analogue of a row-level transaction).

use crate::store::{JobFilter, JobPatch, JobStore, ProgressPatch, StoreError};
use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::{Area, Clock, Job, JobKey, SystemClock};
use std::collections::HashMap;

#[derive(Default)]
struct Inner {
    jobs: HashMap<String, Job>,
    /// Flat composite-key index. Ids accumulate per key; uniqueness at
    /// insert keeps at most one live entry per key.
    key_index: HashMap<JobKey, Vec<String>>,
    areas: HashMap<String, Area>,
    tokens: HashMap<String, String>,
}

pub struct MemoryStore<C: Clock = SystemClock> {
    inner: Mutex<Inner>,
    clock: C,
}

impl MemoryStore<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for MemoryStore<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MemoryStore<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { inner: Mutex::new(Inner::default()), clock }
    }

    /// Seed an account token (tokens are managed by the admin surface,
    /// not the coordination core).
    pub fn set_account_token(&self, account_id: impl Into<String>, token: impl Into<String>) {
        self.inner.lock().tokens.insert(account_id.into(), token.into());
    }

    pub fn remove_account_token(&self, account_id: &str) {
        self.inner.lock().tokens.remove(account_id);
    }

    /// Number of stored areas (test observability).
    pub fn area_count(&self) -> usize {
        self.inner.lock().areas.len()
    }

    pub fn job_count(&self) -> usize {
        self.inner.lock().jobs.len()
    }
}

impl Inner {
    fn occupant(&self, key: &JobKey) -> Option<&Job> {
        let ids = self.key_index.get(key)?;
        ids.iter().find_map(|id| self.jobs.get(id))
    }
}

#[async_trait]
impl<C: Clock> JobStore for MemoryStore<C> {
    async fn find_job(&self, key: &JobKey) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().occupant(key).cloned())
    }

    async fn get_job(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.inner.lock().jobs.get(id).cloned())
    }

    async fn insert_jobs(&self, jobs: Vec<Job>) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let mut inserted = 0;
        for job in jobs {
            let key = job.key();
            if inner.occupant(&key).is_some() {
                continue;
            }
            inner.key_index.entry(key).or_default().push(job.id.clone());
            inner.jobs.insert(job.id.clone(), job);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn update_job(&self, id: &str, patch: JobPatch) -> Result<usize, StoreError> {
        let now_ms = self.clock.epoch_ms();
        let mut inner = self.inner.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            return Ok(0);
        };

        if let Some(expected) = patch.expect_status {
            if job.status != expected {
                return Ok(0);
            }
        }

        if let Some(status) = patch.status {
            job.status = status;
        }
        if let Some(started) = patch.set_started_at {
            job.started_at_ms = Some(started);
        }
        if let Some(finished) = patch.set_finished_at {
            job.finished_at_ms = Some(finished);
        }
        if patch.clear_started_at {
            job.started_at_ms = None;
        }
        if patch.clear_finished_at {
            job.finished_at_ms = None;
        }
        match patch.progress {
            Some(ProgressPatch::Replace(progress)) => job.progress = progress,
            Some(ProgressPatch::Merge(incoming)) => job.progress = job.progress.merge(&incoming),
            None => {}
        }
        if let Some(resume_state) = patch.resume_state {
            job.resume_state = Some(resume_state);
        }
        job.updated_at_ms = now_ms;
        Ok(1)
    }

    async fn find_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>, StoreError> {
        let inner = self.inner.lock();
        let mut jobs: Vec<Job> = inner.jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        // Oldest first, so batch limits drain a backlog fairly
        jobs.sort_by_key(|j| j.updated_at_ms);
        if let Some(limit) = filter.limit {
            jobs.truncate(limit);
        }
        Ok(jobs)
    }

    async fn upsert_areas(&self, areas: Vec<Area>) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let mut inserted = 0;
        for area in areas {
            if inner.areas.contains_key(&area.full_path) {
                continue;
            }
            inner.areas.insert(area.full_path.clone(), area);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn find_account_token(&self, account_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.inner.lock().tokens.get(account_id).cloned())
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
