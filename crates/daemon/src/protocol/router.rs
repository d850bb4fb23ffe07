// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Explicit subscriber fan-out for validated messages.
//!
//! The contract is the payload shapes, not the emission mechanism:
//! subscribers get [`RoutedMessage`]s over bounded channels, observers
//! get [`ProtocolEvent`]s over a broadcast channel that may lag.

use parking_lot::Mutex;
use quarry_core::{ConnectionId, ProtocolEvent};
use quarry_wire::Message;
use tokio::sync::{broadcast, mpsc};

/// Capacity of each subscriber's channel.
const SUBSCRIBER_BUFFER: usize = 256;

/// Capacity of the observability event channel.
const EVENT_BUFFER: usize = 1024;

/// A validated message handed to subscribers.
#[derive(Debug, Clone)]
pub struct RoutedMessage {
    pub connection: ConnectionId,
    pub message: Message,
    pub received_at_ms: u64,
}

pub struct Router {
    subscribers: Mutex<Vec<mpsc::Sender<RoutedMessage>>>,
    events: broadcast::Sender<ProtocolEvent>,
}

impl Default for Router {
    fn default() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self { subscribers: Mutex::new(Vec::new()), events }
    }
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber; all routed messages are cloned to it.
    pub fn subscribe(&self) -> mpsc::Receiver<RoutedMessage> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.lock().push(tx);
        rx
    }

    /// Observe granular protocol events. Lagging observers miss events;
    /// they never block the protocol path.
    pub fn events(&self) -> broadcast::Receiver<ProtocolEvent> {
        self.events.subscribe()
    }

    /// Deliver to every live subscriber, pruning closed ones.
    pub async fn publish(&self, routed: RoutedMessage) {
        let senders: Vec<mpsc::Sender<RoutedMessage>> = self.subscribers.lock().clone();
        let mut closed = false;
        for sender in &senders {
            if sender.send(routed.clone()).await.is_err() {
                closed = true;
            }
        }
        if closed {
            self.subscribers.lock().retain(|s| !s.is_closed());
        }
    }

    pub fn emit(&self, event: ProtocolEvent) {
        // No receivers is fine; events are best-effort observability
        let _ = self.events.send(event);
    }
}
