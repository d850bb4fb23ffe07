// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Protocol handling: framing, parsing, validation, authorization, and
//! routing for one fleet of crawler connections.
//!
//! Each connection owns its framer and metadata; processing for a single
//! connection is strictly sequential, with no ordering guarantee across
//! connections.

mod router;
mod transport;

pub use router::{RoutedMessage, Router};
pub use transport::{FakeTransport, SocketTransport, Transport, TransportError};

use parking_lot::Mutex;
use quarry_core::{Clock, ConnectionId, ConnectionMeta, ProtocolEvent};
use quarry_wire::{
    Body, FrameError, Message, MessageError, MessageFramer, MessageParser, MessageValidator,
    ValidationCtx,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that end or bypass message processing for a connection.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// Fatal to the connection's buffer; requires a forced flush or
    /// connection reset.
    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    #[error("outbound message failed validation: {0}")]
    OutboundValidation(#[from] quarry_wire::ValidationError),

    #[error("failed to encode outbound message: {0}")]
    Encode(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Protocol statistics, exposed for the status surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProtocolStats {
    pub messages_processed: u64,
    pub messages_routed: u64,
    pub parse_errors: u64,
    pub validation_errors: u64,
    pub authorization_errors: u64,
    pub processing_errors: u64,
    pub messages_sent: u64,
    pub send_errors: u64,
}

impl ProtocolStats {
    /// Routed share of all processed inbound messages (1.0 when idle).
    pub fn success_rate(&self) -> f64 {
        if self.messages_processed == 0 {
            return 1.0;
        }
        self.messages_routed as f64 / self.messages_processed as f64
    }
}

/// Outcome of one `process_incoming` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessSummary {
    pub routed: usize,
    pub parse_errors: usize,
    pub validation_errors: usize,
    pub authorization_errors: usize,
    /// Suggested retry delay when the frame buffer is above its
    /// backpressure threshold.
    pub backpressure: Option<Duration>,
}

struct ConnState {
    framer: MessageFramer,
    meta: ConnectionMeta,
}

/// Tunables for the protocol layer.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub frame_capacity: usize,
    pub max_frame_bytes: usize,
    pub max_message_bytes: usize,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            frame_capacity: quarry_wire::DEFAULT_FRAME_CAPACITY,
            max_frame_bytes: quarry_wire::DEFAULT_FRAME_CAPACITY,
            max_message_bytes: quarry_wire::DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

/// Composes framer, parser, and validator per connection and routes
/// validated messages to subscribers.
pub struct ProtocolHandler<C: Clock> {
    clock: C,
    config: HandlerConfig,
    parser: MessageParser,
    validator: MessageValidator,
    connections: Mutex<HashMap<ConnectionId, Arc<Mutex<ConnState>>>>,
    router: Router,
    stats: Mutex<ProtocolStats>,
    transport: Arc<dyn Transport>,
}

impl<C: Clock> ProtocolHandler<C> {
    pub fn new(clock: C, config: HandlerConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            parser: MessageParser::new(config.max_frame_bytes),
            validator: MessageValidator::new(config.max_message_bytes),
            clock,
            config,
            connections: Mutex::new(HashMap::new()),
            router: Router::new(),
            stats: Mutex::new(ProtocolStats::default()),
            transport,
        }
    }

    /// Track a newly accepted connection.
    pub fn open(&self, connection: ConnectionId) {
        let state = ConnState {
            framer: MessageFramer::new(self.config.frame_capacity),
            meta: ConnectionMeta::default(),
        };
        self.connections.lock().insert(connection, Arc::new(Mutex::new(state)));
    }

    /// Drop a connection's state on disconnect.
    pub fn close(&self, connection: &ConnectionId) {
        self.connections.lock().remove(connection);
    }

    /// Mark a connection as authenticated. Authentication itself is an
    /// external concern; this is the supplied boolean taking effect.
    pub fn authenticate(&self, connection: &ConnectionId, crawler_id: impl Into<String>) -> bool {
        match self.conn_state(connection) {
            Ok(state) => {
                state.lock().meta.crawler_id = Some(crawler_id.into());
                true
            }
            Err(_) => false,
        }
    }

    pub fn connection_meta(&self, connection: &ConnectionId) -> Option<ConnectionMeta> {
        self.conn_state(connection).ok().map(|s| s.lock().meta.clone())
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// Register a subscriber for validated messages.
    pub fn subscribe(&self) -> tokio::sync::mpsc::Receiver<RoutedMessage> {
        self.router.subscribe()
    }

    /// Observe granular protocol events.
    pub fn events(&self) -> tokio::sync::broadcast::Receiver<ProtocolEvent> {
        self.router.events()
    }

    pub fn stats(&self) -> ProtocolStats {
        self.stats.lock().clone()
    }

    /// Record a subscriber-side failure (dispatch errors count against
    /// the protocol success rate).
    pub fn note_processing_error(&self, connection: &ConnectionId, error: &str) {
        self.stats.lock().processing_errors += 1;
        self.router.emit(ProtocolEvent::ProcessingError {
            connection: connection.clone(),
            error: error.to_string(),
            at_ms: self.clock.epoch_ms(),
        });
    }

    /// Frame, parse, authorize, validate, and route one chunk of bytes.
    ///
    /// Per-message failures are counted and reported through events; only
    /// buffer overflow (fatal) and unknown connections return `Err`.
    pub async fn process_incoming(
        &self,
        connection: &ConnectionId,
        bytes: &[u8],
    ) -> Result<ProcessSummary, ProtocolError> {
        let now_ms = self.clock.epoch_ms();
        let state = self.conn_state(connection)?;

        let (frames, backpressure) = {
            let mut guard = state.lock();
            guard.framer.push(bytes)?;
            let frames = guard.framer.extract_frames();
            (frames, guard.framer.backpressure())
        };

        if let Some(delay) = backpressure {
            let usage = state.lock().framer.usage();
            self.router.emit(ProtocolEvent::Backpressure {
                connection: connection.clone(),
                usage,
                retry_after_ms: delay.as_millis() as u64,
            });
        }

        let mut summary = ProcessSummary { backpressure, ..ProcessSummary::default() };
        for frame in frames {
            self.process_frame(connection, &state, &frame, now_ms, &mut summary).await;
        }
        Ok(summary)
    }

    /// Emergency drain: treat any buffered partial content as one last
    /// frame, then clear the buffer.
    pub async fn force_flush(
        &self,
        connection: &ConnectionId,
    ) -> Result<ProcessSummary, ProtocolError> {
        let now_ms = self.clock.epoch_ms();
        let state = self.conn_state(connection)?;
        let remainder = state.lock().framer.force_flush();

        let mut summary = ProcessSummary::default();
        if let Some(frame) = remainder {
            debug!(connection = %connection, bytes = frame.len(), "force-flushing partial frame");
            self.process_frame(connection, &state, &frame, now_ms, &mut summary).await;
        }
        Ok(summary)
    }

    /// Validate and deliver an outbound message.
    pub async fn send(
        &self,
        connection: &ConnectionId,
        message: &Message,
    ) -> Result<(), ProtocolError> {
        let now_ms = self.clock.epoch_ms();
        let ctx = ValidationCtx { now_ms, last_heartbeat_ms: None };

        if let Err(e) = self.validator.validate_outbound(message, &ctx) {
            self.stats.lock().send_errors += 1;
            self.router.emit(ProtocolEvent::SendError {
                connection: connection.clone(),
                kind: message.kind().to_string(),
                error: e.to_string(),
                at_ms: now_ms,
            });
            return Err(e.into());
        }

        let mut frame =
            serde_json::to_vec(message).map_err(|e| ProtocolError::Encode(e.to_string()))?;
        frame.push(b'\n');

        match self.transport.deliver(connection, frame).await {
            Ok(()) => {
                self.stats.lock().messages_sent += 1;
                self.router.emit(ProtocolEvent::MessageSent {
                    connection: connection.clone(),
                    kind: message.kind().to_string(),
                    at_ms: now_ms,
                });
                Ok(())
            }
            Err(e) => {
                self.stats.lock().send_errors += 1;
                self.router.emit(ProtocolEvent::SendError {
                    connection: connection.clone(),
                    kind: message.kind().to_string(),
                    error: e.to_string(),
                    at_ms: now_ms,
                });
                Err(ProtocolError::Transport(e.to_string()))
            }
        }
    }

    fn conn_state(&self, connection: &ConnectionId) -> Result<Arc<Mutex<ConnState>>, ProtocolError> {
        self.connections
            .lock()
            .get(connection)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownConnection(connection.clone()))
    }

    async fn process_frame(
        &self,
        connection: &ConnectionId,
        state: &Arc<Mutex<ConnState>>,
        frame: &[u8],
        now_ms: u64,
        summary: &mut ProcessSummary,
    ) {
        self.stats.lock().messages_processed += 1;

        let parsed = match self.parser.parse(frame, now_ms) {
            Ok(parsed) => parsed,
            Err(MessageError::Parse(e)) => {
                self.stats.lock().parse_errors += 1;
                summary.parse_errors += 1;
                warn!(connection = %connection, error = %e, "frame parse failed");
                self.router.emit(ProtocolEvent::ParseError {
                    connection: connection.clone(),
                    error: e.to_string(),
                    at_ms: now_ms,
                });
                return;
            }
            Err(MessageError::Validation(e)) => {
                self.record_validation_error(connection, "<structural>", &e.to_string(), now_ms);
                summary.validation_errors += 1;
                return;
            }
        };

        let (authenticated, last_heartbeat_ms) = {
            let guard = state.lock();
            (guard.meta.is_authenticated(), guard.meta.last_heartbeat_ms)
        };

        if parsed.message.is_job_scoped() && (!authenticated || parsed.message.job_id.is_none()) {
            self.stats.lock().authorization_errors += 1;
            summary.authorization_errors += 1;
            warn!(
                connection = %connection,
                kind = parsed.kind,
                authenticated,
                "unauthorized job-scoped message"
            );
            self.router.emit(ProtocolEvent::AuthorizationError {
                connection: connection.clone(),
                kind: parsed.kind.clone(),
                at_ms: now_ms,
            });
            return;
        }

        let ctx = ValidationCtx { now_ms, last_heartbeat_ms };
        if let Err(e) = self.validator.validate(&parsed, &ctx) {
            self.record_validation_error(connection, &parsed.kind, &e.to_string(), now_ms);
            summary.validation_errors += 1;
            return;
        }

        {
            let mut guard = state.lock();
            match &parsed.message.body {
                Body::Heartbeat(data) => {
                    guard.meta.record_heartbeat(
                        now_ms,
                        data.active_jobs.max(0) as u32,
                        data.system_status,
                    );
                }
                Body::JobStarted(_)
                | Body::JobProgress(_)
                | Body::JobCompleted(_)
                | Body::JobFailed(_) => guard.meta.record_activity(now_ms),
                _ => {}
            }
        }

        let kind = parsed.kind;
        let job_id = parsed.message.job_id.clone();
        self.router
            .publish(RoutedMessage {
                connection: connection.clone(),
                message: parsed.message,
                received_at_ms: now_ms,
            })
            .await;

        self.stats.lock().messages_routed += 1;
        summary.routed += 1;
        self.router.emit(ProtocolEvent::MessageRouted {
            connection: connection.clone(),
            kind,
            job_id,
            at_ms: now_ms,
        });
    }

    fn record_validation_error(
        &self,
        connection: &ConnectionId,
        kind: &str,
        error: &str,
        now_ms: u64,
    ) {
        self.stats.lock().validation_errors += 1;
        warn!(connection = %connection, kind, error, "message failed validation");
        self.router.emit(ProtocolEvent::ValidationError {
            connection: connection.clone(),
            kind: kind.to_string(),
            error: error.to_string(),
            at_ms: now_ms,
        });
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
