// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Operator-facing aggregate health snapshot.
//!
//! Consumed by status pollers and the live stream; not part of the
//! write path.

use serde::Serialize;

/// System-wide health: UI channel AND worker channel AND heartbeat
/// freshness. Heartbeat freshness is authoritative: a stale heartbeat
/// forcibly flips a "connected" worker channel to disconnected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub ui_connected: bool,
    pub worker_connected: bool,
    pub heartbeat_fresh: bool,
    pub last_heartbeat_ms: Option<u64>,
    pub tracked_connections: usize,
}

impl HealthStatus {
    pub fn evaluate(
        ui_connected: bool,
        worker_connected: bool,
        heartbeat_fresh: bool,
        last_heartbeat_ms: Option<u64>,
        tracked_connections: usize,
    ) -> Self {
        Self {
            healthy: ui_connected && worker_connected && heartbeat_fresh,
            ui_connected,
            worker_connected,
            heartbeat_fresh,
            last_heartbeat_ms,
            tracked_connections,
        }
    }
}
