// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection identity and metadata.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for one transport session with a crawler worker.
    ///
    /// Created when the connection is accepted, destroyed on disconnect.
    pub struct ConnectionId("con-");
}

/// Self-reported crawler state carried in heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    #[default]
    Idle,
    Discovering,
    Crawling,
    Error,
}

crate::simple_display! {
    SystemStatus {
        Idle => "idle",
        Discovering => "discovering",
        Crawling => "crawling",
        Error => "error",
    }
}

/// Mutable metadata tracked for one live connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionMeta {
    /// Crawler identity, set once the connection is authenticated.
    pub crawler_id: Option<String>,
    pub last_heartbeat_ms: Option<u64>,
    pub last_activity_ms: Option<u64>,
    pub missed_heartbeats: u32,
    pub active_jobs: u32,
    pub system_status: SystemStatus,
}

impl ConnectionMeta {
    /// Whether the connection has been authenticated as a worker.
    pub fn is_authenticated(&self) -> bool {
        self.crawler_id.is_some()
    }

    /// Apply a heartbeat: stamp the time, reset the missed counter, and
    /// record the worker's self-reported state.
    pub fn record_heartbeat(&mut self, now_ms: u64, active_jobs: u32, status: SystemStatus) {
        self.last_heartbeat_ms = Some(now_ms);
        self.missed_heartbeats = 0;
        self.active_jobs = active_jobs;
        self.system_status = status;
    }

    /// Stamp activity time (job-lifecycle messages).
    pub fn record_activity(&mut self, now_ms: u64) {
        self.last_activity_ms = Some(now_ms);
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
