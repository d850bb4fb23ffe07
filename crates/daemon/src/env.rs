// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.parse::<u64>().ok())
}

/// TCP port the worker listener binds (default 7333).
pub fn tcp_port() -> u16 {
    env_u64("QUARRY_TCP_PORT").map(|p| p as u16).unwrap_or(7333)
}

/// Auth token workers must present in the connection handshake.
/// When unset, any handshake is accepted.
pub fn auth_token() -> Option<String> {
    std::env::var("QUARRY_AUTH_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Directory for daemon log files (default `./logs`).
pub fn log_dir() -> PathBuf {
    std::env::var("QUARRY_LOG_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("logs"))
}

/// Per-connection frame buffer capacity.
pub fn frame_buffer_bytes() -> usize {
    env_u64("QUARRY_FRAME_BUFFER_BYTES")
        .map(|v| v as usize)
        .unwrap_or(quarry_wire::DEFAULT_FRAME_CAPACITY)
}

/// Secondary per-message size bound.
pub fn max_message_bytes() -> usize {
    env_u64("QUARRY_MAX_MESSAGE_BYTES")
        .map(|v| v as usize)
        .unwrap_or(quarry_wire::DEFAULT_MAX_MESSAGE_BYTES)
}

/// Interval between recovery sweeps (default 30 minutes).
pub fn recovery_interval() -> Duration {
    env_u64("QUARRY_RECOVERY_INTERVAL_MS")
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30 * 60))
}

/// Heartbeat timeout window (default 30 seconds).
pub fn heartbeat_timeout() -> Duration {
    env_u64("QUARRY_HEARTBEAT_TIMEOUT_MS")
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(30))
}

/// GitLab instance crawl jobs run against.
pub fn gitlab_host() -> String {
    std::env::var("QUARRY_GITLAB_HOST").unwrap_or_else(|_| "https://gitlab.com".to_string())
}
