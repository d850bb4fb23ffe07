// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound transport seam.
//!
//! The listener registers one sender per live socket; tests use the
//! recording fake.

use async_trait::async_trait;
use parking_lot::Mutex;
use quarry_core::ConnectionId;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection {0} is not registered")]
    NotRegistered(ConnectionId),

    #[error("connection {0} is closed")]
    Closed(ConnectionId),
}

/// Delivers already-framed bytes to a connection.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, connection: &ConnectionId, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Drop the connection's outbound channel (heartbeat death, shutdown).
    fn disconnect(&self, connection: &ConnectionId);
}

/// Transport backed by per-connection mpsc channels; the listener's
/// writer task drains each receiver into its socket.
#[derive(Default)]
pub struct SocketTransport {
    senders: Mutex<HashMap<ConnectionId, mpsc::Sender<Vec<u8>>>>,
}

impl SocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, connection: ConnectionId, sender: mpsc::Sender<Vec<u8>>) {
        self.senders.lock().insert(connection, sender);
    }

    pub fn unregister(&self, connection: &ConnectionId) {
        self.senders.lock().remove(connection);
    }
}

#[async_trait]
impl Transport for SocketTransport {
    async fn deliver(&self, connection: &ConnectionId, frame: Vec<u8>) -> Result<(), TransportError> {
        let sender = self
            .senders
            .lock()
            .get(connection)
            .cloned()
            .ok_or_else(|| TransportError::NotRegistered(connection.clone()))?;
        sender
            .send(frame)
            .await
            .map_err(|_| TransportError::Closed(connection.clone()))
    }

    fn disconnect(&self, connection: &ConnectionId) {
        self.unregister(connection);
    }
}

/// Recording transport for tests.
#[derive(Default)]
pub struct FakeTransport {
    frames: Mutex<HashMap<ConnectionId, Vec<Vec<u8>>>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames delivered to a connection, in order.
    pub fn sent_to(&self, connection: &ConnectionId) -> Vec<Vec<u8>> {
        self.frames.lock().get(connection).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn deliver(&self, connection: &ConnectionId, frame: Vec<u8>) -> Result<(), TransportError> {
        self.frames.lock().entry(connection.clone()).or_default().push(frame);
        Ok(())
    }

    fn disconnect(&self, connection: &ConnectionId) {
        self.frames.lock().remove(connection);
    }
}
