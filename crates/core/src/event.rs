// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed observability events emitted by the protocol layer.
//!
//! Serializes with `{"type": "event_name", ...fields}` format. These are
//! the contract the old emitter-style fan-out exposed; the emission
//! mechanism is an explicit channel, not part of the contract.

use crate::connection::ConnectionId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// A validated message was routed to subscribers.
    MessageRouted {
        connection: ConnectionId,
        kind: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
        at_ms: u64,
    },

    ParseError {
        connection: ConnectionId,
        error: String,
        at_ms: u64,
    },

    ValidationError {
        connection: ConnectionId,
        kind: String,
        error: String,
        at_ms: u64,
    },

    /// Unauthenticated connection sent a job-scoped message.
    AuthorizationError {
        connection: ConnectionId,
        kind: String,
        at_ms: u64,
    },

    /// A subscriber failed while handling a routed message.
    ProcessingError {
        connection: ConnectionId,
        error: String,
        at_ms: u64,
    },

    MessageSent {
        connection: ConnectionId,
        kind: String,
        at_ms: u64,
    },

    SendError {
        connection: ConnectionId,
        kind: String,
        error: String,
        at_ms: u64,
    },

    /// The framer crossed its backpressure threshold.
    Backpressure {
        connection: ConnectionId,
        usage: f64,
        retry_after_ms: u64,
    },

    MissedHeartbeat {
        connection: ConnectionId,
        missed: u32,
    },

    /// Three consecutive missed heartbeats; the connection is being
    /// disconnected.
    ConnectionDead {
        connection: ConnectionId,
    },
}

impl ProtocolEvent {
    /// Event name for log spans.
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::MessageRouted { .. } => "message_routed",
            ProtocolEvent::ParseError { .. } => "parse_error",
            ProtocolEvent::ValidationError { .. } => "validation_error",
            ProtocolEvent::AuthorizationError { .. } => "authorization_error",
            ProtocolEvent::ProcessingError { .. } => "processing_error",
            ProtocolEvent::MessageSent { .. } => "message_sent",
            ProtocolEvent::SendError { .. } => "send_error",
            ProtocolEvent::Backpressure { .. } => "backpressure",
            ProtocolEvent::MissedHeartbeat { .. } => "missed_heartbeat",
            ProtocolEvent::ConnectionDead { .. } => "connection_dead",
        }
    }
}
