// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Frame → typed message decoding with structural checks.
//!
//! Malformed JSON and oversized frames are parse errors; a decoded object
//! with a missing/stale/future timestamp or a bad payload shape is a
//! validation error. The distinction matters for error accounting: both
//! are per-message and the connection survives either.

use crate::message::Message;
use crate::validator::ValidationError;
use quarry_core::parse_rfc3339;
use thiserror::Error;

/// Messages older than this are rejected.
pub const MAX_TIMESTAMP_AGE_MS: u64 = 24 * 60 * 60 * 1000;

/// Maximum tolerated clock skew into the future.
pub const MAX_TIMESTAMP_SKEW_MS: u64 = 5 * 60 * 1000;

/// Default maximum frame size accepted before decode (1 MiB).
const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("frame of {size} bytes exceeds maximum {max}")]
    Oversized { size: usize, max: usize },

    #[error("malformed JSON: {0}")]
    Json(String),
}

/// Either failure mode of decoding one frame.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MessageError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// A successfully decoded message plus what the validator needs to know
/// about its wire form.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub message: Message,
    /// The raw `type` string (kept for unknown-type reporting).
    pub kind: String,
    /// Serialized frame size, for the secondary size check.
    pub frame_len: usize,
}

/// Result of parsing a batch of frames: partial success is normal.
#[derive(Debug, Default)]
pub struct ParseBatch {
    pub messages: Vec<ParsedMessage>,
    pub errors: Vec<String>,
}

impl ParseBatch {
    /// Concatenated description of every failed frame, if any failed.
    pub fn error_summary(&self) -> Option<String> {
        if self.errors.is_empty() {
            None
        } else {
            Some(self.errors.join("; "))
        }
    }
}

/// Decodes one frame into a typed [`Message`].
#[derive(Debug, Clone)]
pub struct MessageParser {
    max_frame_bytes: usize,
}

impl Default for MessageParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl MessageParser {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self { max_frame_bytes }
    }

    /// Decode and structurally check a single frame.
    pub fn parse(&self, frame: &[u8], now_ms: u64) -> Result<ParsedMessage, MessageError> {
        if frame.len() > self.max_frame_bytes {
            return Err(ParseError::Oversized { size: frame.len(), max: self.max_frame_bytes }.into());
        }

        let value: serde_json::Value =
            serde_json::from_slice(frame).map_err(|e| ParseError::Json(e.to_string()))?;

        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        let kind = object
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(ValidationError::MissingType)?
            .to_string();

        let raw_timestamp = object
            .get("timestamp")
            .and_then(|v| v.as_str())
            .ok_or(ValidationError::MissingTimestamp)?;

        let timestamp_ms = parse_rfc3339(raw_timestamp)
            .ok_or_else(|| ValidationError::InvalidTimestamp(raw_timestamp.to_string()))?;

        if timestamp_ms + MAX_TIMESTAMP_AGE_MS < now_ms {
            return Err(ValidationError::StaleTimestamp {
                age_ms: now_ms - timestamp_ms,
            }
            .into());
        }
        if timestamp_ms > now_ms + MAX_TIMESTAMP_SKEW_MS {
            return Err(ValidationError::FutureTimestamp {
                skew_ms: timestamp_ms - now_ms,
            }
            .into());
        }

        let message: Message = serde_json::from_value(value).map_err(|e| {
            ValidationError::InvalidPayload { kind: kind.clone(), reason: e.to_string() }
        })?;

        Ok(ParsedMessage { message, kind, frame_len: frame.len() })
    }

    /// Parse each frame independently; failures never mask successes.
    pub fn parse_frames(&self, frames: &[Vec<u8>], now_ms: u64) -> ParseBatch {
        let mut batch = ParseBatch::default();
        for (index, frame) in frames.iter().enumerate() {
            match self.parse(frame, now_ms) {
                Ok(parsed) => batch.messages.push(parsed),
                Err(e) => batch.errors.push(format!("frame {index}: {e}")),
            }
        }
        batch
    }
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
