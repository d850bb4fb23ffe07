// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat tracking and missed-heartbeat detection.
//!
//! A periodic check (shorter than the timeout) raises one missed
//! heartbeat per silent window; three consecutive misses mark the
//! connection dead and trigger disconnection. The check timer runs on
//! its own task and is never starved by message work.

use crate::health::HealthStatus;
use parking_lot::Mutex;
use quarry_core::{Clock, ConnectionId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// No heartbeat within this window counts as one miss (default 30s).
    pub timeout: Duration,
    /// Check cadence; must be shorter than `timeout` (default 10s).
    pub check_interval: Duration,
    /// Consecutive misses before the connection is declared dead.
    pub max_missed: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            check_interval: Duration::from_secs(10),
            max_missed: 3,
        }
    }
}

struct TrackedConnection {
    last_heartbeat_ms: Option<u64>,
    /// Start of the current silent window: tracking time, the last
    /// heartbeat, or the last recorded miss.
    baseline_ms: u64,
    missed: u32,
}

#[derive(Default)]
struct ChannelFlags {
    ui_connected: bool,
    worker_connected: bool,
}

/// Result of one periodic check.
#[derive(Debug, Default, PartialEq)]
pub struct CheckOutcome {
    pub missed: Vec<(ConnectionId, u32)>,
    pub dead: Vec<ConnectionId>,
}

pub struct HeartbeatMonitor<C: Clock> {
    clock: C,
    config: HeartbeatConfig,
    connections: Mutex<HashMap<ConnectionId, TrackedConnection>>,
    channels: Mutex<ChannelFlags>,
    health_tx: broadcast::Sender<HealthStatus>,
    last_health: Mutex<Option<HealthStatus>>,
}

impl<C: Clock> HeartbeatMonitor<C> {
    pub fn new(clock: C, config: HeartbeatConfig) -> Self {
        let (health_tx, _) = broadcast::channel(64);
        Self {
            clock,
            config,
            connections: Mutex::new(HashMap::new()),
            channels: Mutex::new(ChannelFlags::default()),
            health_tx,
            last_health: Mutex::new(None),
        }
    }

    pub fn track(&self, connection: ConnectionId) {
        let now_ms = self.clock.epoch_ms();
        self.connections.lock().insert(
            connection,
            TrackedConnection { last_heartbeat_ms: None, baseline_ms: now_ms, missed: 0 },
        );
    }

    pub fn untrack(&self, connection: &ConnectionId) {
        self.connections.lock().remove(connection);
    }

    /// Apply a heartbeat: reset the miss counter and stamp the time.
    /// A live heartbeat also proves the worker channel is connected.
    pub fn record_heartbeat(&self, connection: &ConnectionId) {
        let now_ms = self.clock.epoch_ms();
        if let Some(tracked) = self.connections.lock().get_mut(connection) {
            tracked.last_heartbeat_ms = Some(now_ms);
            tracked.baseline_ms = now_ms;
            tracked.missed = 0;
        }
        self.channels.lock().worker_connected = true;
        self.publish_health();
    }

    pub fn missed_heartbeats(&self, connection: &ConnectionId) -> Option<u32> {
        self.connections.lock().get(connection).map(|t| t.missed)
    }

    /// Externally-supplied flag from the operator-facing status stream.
    pub fn set_ui_connected(&self, connected: bool) {
        self.channels.lock().ui_connected = connected;
        self.publish_health();
    }

    /// Externally-supplied flag for the worker channel. Heartbeat
    /// freshness remains authoritative over this.
    pub fn set_worker_connected(&self, connected: bool) {
        self.channels.lock().worker_connected = connected;
        self.publish_health();
    }

    /// Run one missed-heartbeat sweep. Dead connections are removed from
    /// tracking; actually disconnecting them is the caller's job.
    pub fn check_once(&self) -> CheckOutcome {
        let now_ms = self.clock.epoch_ms();
        let timeout_ms = self.config.timeout.as_millis() as u64;
        let mut outcome = CheckOutcome::default();

        {
            let mut connections = self.connections.lock();
            for (connection, tracked) in connections.iter_mut() {
                if now_ms.saturating_sub(tracked.baseline_ms) < timeout_ms {
                    continue;
                }
                tracked.missed += 1;
                tracked.baseline_ms = now_ms;
                warn!(connection = %connection, missed = tracked.missed, "missed heartbeat");
                outcome.missed.push((connection.clone(), tracked.missed));
                if tracked.missed >= self.config.max_missed {
                    outcome.dead.push(connection.clone());
                }
            }
            for connection in &outcome.dead {
                connections.remove(connection);
            }
        }

        for connection in &outcome.dead {
            warn!(connection = %connection, "connection dead after consecutive missed heartbeats");
        }
        self.publish_health();
        outcome
    }

    /// Current aggregate health. A stale heartbeat while the worker
    /// channel claims "connected" flips the flag; freshness wins.
    pub fn health(&self) -> HealthStatus {
        let now_ms = self.clock.epoch_ms();
        let timeout_ms = self.config.timeout.as_millis() as u64;

        let (last_heartbeat_ms, tracked_connections) = {
            let connections = self.connections.lock();
            let last = connections.values().filter_map(|t| t.last_heartbeat_ms).max();
            (last, connections.len())
        };

        let heartbeat_fresh = last_heartbeat_ms
            .is_some_and(|last| now_ms.saturating_sub(last) <= timeout_ms);

        let mut channels = self.channels.lock();
        if !heartbeat_fresh && channels.worker_connected {
            warn!("stale heartbeat with worker channel flagged connected; forcing disconnected");
            channels.worker_connected = false;
        }

        HealthStatus::evaluate(
            channels.ui_connected,
            channels.worker_connected,
            heartbeat_fresh,
            last_heartbeat_ms,
            tracked_connections,
        )
    }

    /// Live stream of health transitions.
    pub fn subscribe_health(&self) -> broadcast::Receiver<HealthStatus> {
        self.health_tx.subscribe()
    }

    /// Spawn the periodic check task. Dead connections are reported on
    /// `on_dead`; the task stops when `cancel` fires.
    pub fn start(
        self: &Arc<Self>,
        cancel: CancellationToken,
        on_dead: mpsc::Sender<ConnectionId>,
    ) -> tokio::task::JoinHandle<()>
    where
        C: 'static,
    {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(monitor.config.check_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("heartbeat monitor stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        let outcome = monitor.check_once();
                        for connection in outcome.dead {
                            if on_dead.send(connection).await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        })
    }

    fn publish_health(&self) {
        let health = self.health();
        let mut last = self.last_health.lock();
        if last.as_ref() != Some(&health) {
            *last = Some(health.clone());
            let _ = self.health_tx.send(health);
        }
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
