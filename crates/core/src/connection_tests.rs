// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn new_connection_is_unauthenticated() {
    let meta = ConnectionMeta::default();
    assert!(!meta.is_authenticated());
    assert_eq!(meta.system_status, SystemStatus::Idle);
    assert_eq!(meta.missed_heartbeats, 0);
}

#[test]
fn heartbeat_resets_missed_counter() {
    let mut meta = ConnectionMeta { missed_heartbeats: 2, ..ConnectionMeta::default() };

    meta.record_heartbeat(1_000, 3, SystemStatus::Crawling);

    assert_eq!(meta.missed_heartbeats, 0);
    assert_eq!(meta.last_heartbeat_ms, Some(1_000));
    assert_eq!(meta.active_jobs, 3);
    assert_eq!(meta.system_status, SystemStatus::Crawling);
}

#[test]
fn activity_does_not_touch_heartbeat() {
    let mut meta = ConnectionMeta::default();
    meta.record_heartbeat(1_000, 0, SystemStatus::Idle);
    meta.record_activity(2_000);

    assert_eq!(meta.last_heartbeat_ms, Some(1_000));
    assert_eq!(meta.last_activity_ms, Some(2_000));
}

#[test]
fn connection_id_has_prefix() {
    let id = ConnectionId::generate();
    assert!(id.as_str().starts_with("con-"));
    assert_eq!(id.as_str().len(), 23);
}
