// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-type business-rule validation.
//!
//! Structural shape is enforced by typed decoding in the parser (e.g.
//! `system_status` must be one of the known states); this layer holds the
//! rules that depend on values and per-connection context.

use crate::message::{Body, Message};
use crate::parser::ParsedMessage;
use thiserror::Error;

/// Default maximum serialized message size (1 MiB). Independent of the
/// per-frame limit in the parser.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Minimum interval between consecutive heartbeats from one connection.
const MIN_HEARTBEAT_INTERVAL_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("message is not a JSON object")]
    NotAnObject,

    #[error("message has no string `type`")]
    MissingType,

    #[error("message has no string `timestamp`")]
    MissingTimestamp,

    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("timestamp is {age_ms}ms old (max 24h)")]
    StaleTimestamp { age_ms: u64 },

    #[error("timestamp is {skew_ms}ms in the future (max 5m)")]
    FutureTimestamp { skew_ms: u64 },

    #[error("invalid `{kind}` payload: {reason}")]
    InvalidPayload { kind: String, reason: String },

    #[error("unknown message type `{kind}`")]
    UnknownType { kind: String },

    #[error("message of {size} bytes exceeds maximum {max}")]
    Oversized { size: usize, max: usize },

    #[error("heartbeat too frequent: {elapsed_ms}ms since last (min {min_ms}ms)")]
    HeartbeatTooFrequent { elapsed_ms: u64, min_ms: u64 },

    #[error("active_jobs must be >= 0, got {0}")]
    NegativeActiveJobs(i64),

    #[error("overall_completion must be within [0, 1], got {0}")]
    CompletionOutOfRange(f64),

    #[error("entity `{entity}`: processed {processed} exceeds discovered {discovered}")]
    EntityCountsInconsistent { entity: String, processed: u64, discovered: u64 },

    #[error("`{kind}` requires a job_id")]
    MissingJobId { kind: String },

    #[error("job_id `{job_id}` is too short (min 3 chars)")]
    JobIdTooShort { job_id: String },

    #[error("access_token is too short (min 10 chars)")]
    AccessTokenTooShort,

    #[error("gitlab_host `{host}` is not a valid URL: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("token_refresh_response marked successful but carries no access_token")]
    MissingAccessToken,

    #[error("timeout_seconds must be >= 0, got {0}")]
    NegativeTimeout(i64),
}

/// Per-connection context the rules depend on.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationCtx {
    pub now_ms: u64,
    /// When this connection's previous heartbeat arrived.
    pub last_heartbeat_ms: Option<u64>,
}

/// Stateless rule set; per-connection state lives in [`ValidationCtx`].
#[derive(Debug, Clone)]
pub struct MessageValidator {
    max_message_bytes: usize,
    min_heartbeat_interval_ms: u64,
}

impl Default for MessageValidator {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            min_heartbeat_interval_ms: MIN_HEARTBEAT_INTERVAL_MS,
        }
    }
}

impl MessageValidator {
    pub fn new(max_message_bytes: usize) -> Self {
        Self { max_message_bytes, ..Self::default() }
    }

    /// Validate an inbound message that came through the parser.
    pub fn validate(&self, parsed: &ParsedMessage, ctx: &ValidationCtx) -> Result<(), ValidationError> {
        if parsed.frame_len > self.max_message_bytes {
            return Err(ValidationError::Oversized {
                size: parsed.frame_len,
                max: self.max_message_bytes,
            });
        }
        self.validate_message(&parsed.message, &parsed.kind, ctx)
    }

    /// Validate an outbound message before it reaches the transport.
    pub fn validate_outbound(&self, message: &Message, ctx: &ValidationCtx) -> Result<(), ValidationError> {
        let serialized = serde_json::to_vec(message)
            .map_err(|e| ValidationError::InvalidPayload {
                kind: message.kind().to_string(),
                reason: e.to_string(),
            })?;
        if serialized.len() > self.max_message_bytes {
            return Err(ValidationError::Oversized {
                size: serialized.len(),
                max: self.max_message_bytes,
            });
        }
        self.validate_message(message, message.kind(), ctx)
    }

    fn validate_message(
        &self,
        message: &Message,
        kind: &str,
        ctx: &ValidationCtx,
    ) -> Result<(), ValidationError> {
        match &message.body {
            Body::Heartbeat(data) => {
                if data.active_jobs < 0 {
                    return Err(ValidationError::NegativeActiveJobs(data.active_jobs));
                }
                if let Some(last) = ctx.last_heartbeat_ms {
                    let elapsed = ctx.now_ms.saturating_sub(last);
                    if elapsed < self.min_heartbeat_interval_ms {
                        return Err(ValidationError::HeartbeatTooFrequent {
                            elapsed_ms: elapsed,
                            min_ms: self.min_heartbeat_interval_ms,
                        });
                    }
                }
                Ok(())
            }

            Body::JobProgress(data) => {
                if let Some(completion) = data.overall_completion {
                    if !(0.0..=1.0).contains(&completion) {
                        return Err(ValidationError::CompletionOutOfRange(completion));
                    }
                }
                for (entity, counts) in &data.progress.entities {
                    if counts.total_processed > counts.total_discovered {
                        return Err(ValidationError::EntityCountsInconsistent {
                            entity: entity.clone(),
                            processed: counts.total_processed,
                            discovered: counts.total_discovered,
                        });
                    }
                }
                require_job_id(message, kind)
            }

            Body::JobStarted(_) | Body::JobCompleted(_) | Body::JobFailed(_) => {
                require_job_id(message, kind)
            }

            Body::TokenRefreshRequest(_) => match &message.job_id {
                Some(_) => Ok(()),
                None => Err(ValidationError::MissingJobId { kind: kind.to_string() }),
            },

            Body::JobAssignment(data) => {
                require_job_id(message, kind)?;
                if data.access_token.len() < 10 {
                    return Err(ValidationError::AccessTokenTooShort);
                }
                url::Url::parse(&data.gitlab_host).map_err(|e| ValidationError::InvalidHost {
                    host: data.gitlab_host.clone(),
                    reason: e.to_string(),
                })?;
                Ok(())
            }

            Body::TokenRefreshResponse(data) => {
                if data.refresh_successful && data.access_token.is_none() {
                    return Err(ValidationError::MissingAccessToken);
                }
                Ok(())
            }

            Body::Shutdown(data) => match data.timeout_seconds {
                Some(timeout) if timeout < 0 => Err(ValidationError::NegativeTimeout(timeout)),
                _ => Ok(()),
            },

            Body::Unknown => Err(ValidationError::UnknownType { kind: kind.to_string() }),
        }
    }
}

fn require_job_id(message: &Message, kind: &str) -> Result<(), ValidationError> {
    match &message.job_id {
        None => Err(ValidationError::MissingJobId { kind: kind.to_string() }),
        Some(job_id) if job_id.len() < 3 => {
            Err(ValidationError::JobIdTooShort { job_id: job_id.clone() })
        }
        Some(_) => Ok(()),
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
