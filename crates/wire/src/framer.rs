// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection frame accumulation with a bounded buffer.
//!
//! The delimiter (default `\n`) cannot appear unescaped inside valid JSON
//! text, so a delimiter byte is always a frame boundary.

use std::time::Duration;
use thiserror::Error;

/// Default per-connection buffer capacity (1 MiB).
pub const DEFAULT_FRAME_CAPACITY: usize = 1024 * 1024;

/// Fill ratio above which the framer signals backpressure.
pub const BACKPRESSURE_THRESHOLD: f64 = 0.8;

/// Suggested retry delay while under backpressure.
pub const BACKPRESSURE_RETRY: Duration = Duration::from_millis(100);

/// Errors from frame accumulation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Fatal for this connection: the buffer cannot hold the incoming
    /// bytes. Not retryable without a forced flush or connection reset.
    #[error("frame buffer overflow: {needed} bytes needed, capacity {capacity}")]
    Overflow { needed: usize, capacity: usize },
}

/// Accumulates bytes for one connection and extracts complete frames.
#[derive(Debug)]
pub struct MessageFramer {
    buf: Vec<u8>,
    capacity: usize,
    delimiter: Vec<u8>,
}

impl Default for MessageFramer {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_CAPACITY)
    }
}

impl MessageFramer {
    /// Create a framer with the default `\n` delimiter.
    pub fn new(capacity: usize) -> Self {
        Self::with_delimiter(capacity, b"\n".to_vec())
    }

    pub fn with_delimiter(capacity: usize, delimiter: Vec<u8>) -> Self {
        Self { buf: Vec::new(), capacity, delimiter }
    }

    /// Append bytes to the buffer.
    ///
    /// On overflow nothing is appended and the buffered content is left
    /// intact for a forced flush.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        let needed = self.buf.len() + bytes.len();
        if needed > self.capacity {
            return Err(FrameError::Overflow { needed, capacity: self.capacity });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Extract all complete delimiter-terminated frames, retaining any
    /// trailing partial frame. Blank frames (consecutive delimiters) are
    /// skipped.
    pub fn extract_frames(&mut self) -> Vec<Vec<u8>> {
        let mut frames = Vec::new();
        let mut start = 0;
        while let Some(pos) = find_subsequence(&self.buf[start..], &self.delimiter) {
            let end = start + pos;
            if end > start {
                frames.push(self.buf[start..end].to_vec());
            }
            start = end + self.delimiter.len();
        }
        if start > 0 {
            self.buf.drain(..start);
        }
        frames
    }

    /// Current fill ratio, 0..1.
    pub fn usage(&self) -> f64 {
        if self.capacity == 0 {
            return 1.0;
        }
        self.buf.len() as f64 / self.capacity as f64
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    /// Inspect up to `n` buffered bytes without consuming them.
    pub fn peek(&self, n: usize) -> &[u8] {
        &self.buf[..self.buf.len().min(n)]
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Emergency drain: take whatever partial content remains as one last
    /// frame attempt and clear the buffer.
    pub fn force_flush(&mut self) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }

    /// Suggested retry delay when the buffer is above the backpressure
    /// threshold.
    pub fn backpressure(&self) -> Option<Duration> {
        (self.usage() >= BACKPRESSURE_THRESHOLD).then_some(BACKPRESSURE_RETRY)
    }
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
#[path = "framer_tests.rs"]
mod tests;
