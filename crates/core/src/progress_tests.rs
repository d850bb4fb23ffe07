// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_support::strategies::*;
use proptest::prelude::*;

fn with_processed(processed: u64, total: Option<u64>) -> JobProgress {
    JobProgress { processed_items: processed, total_items: total, ..JobProgress::default() }
}

#[test]
fn merge_takes_max_of_processed() {
    let existing = with_processed(10, None);
    let incoming = with_processed(7, None);

    // A late or duplicate report must never make progress regress
    assert_eq!(existing.merge(&incoming).processed_items, 10);
    assert_eq!(incoming.merge(&existing).processed_items, 10);
}

#[test]
fn merge_replaces_total_with_incoming() {
    let existing = with_processed(5, Some(100));
    let incoming = with_processed(5, Some(80));

    // Totals may legitimately be revised downward as discovery continues
    assert_eq!(existing.merge(&incoming).total_items, Some(80));
}

#[test]
fn merge_keeps_existing_total_when_incoming_has_none() {
    let existing = with_processed(5, Some(100));
    let incoming = with_processed(6, None);

    assert_eq!(existing.merge(&incoming).total_items, Some(100));
}

#[test]
fn merge_sums_items_by_type() {
    let mut existing = JobProgress::default();
    existing.items_by_type.insert("groups".to_string(), 3);
    let mut incoming = JobProgress::default();
    incoming.items_by_type.insert("groups".to_string(), 2);
    incoming.items_by_type.insert("projects".to_string(), 4);

    let merged = existing.merge(&incoming);
    assert_eq!(merged.items_by_type["groups"], 5);
    assert_eq!(merged.items_by_type["projects"], 4);
}

#[test]
fn merge_appends_timeline() {
    let mut existing = JobProgress::default();
    existing.push_timeline(TimelineEvent::new(1, "started"));
    let mut incoming = JobProgress::default();
    incoming.push_timeline(TimelineEvent::new(2, "stage_change"));

    let merged = existing.merge(&incoming);
    assert_eq!(merged.timeline.len(), 2);
    assert_eq!(merged.timeline[0].event, "started");
    assert_eq!(merged.timeline[1].event, "stage_change");
}

#[test]
fn timeline_ring_discards_oldest() {
    let mut progress = JobProgress::default();
    for i in 0..(TIMELINE_CAP as u64 + 10) {
        progress.push_timeline(TimelineEvent::new(i, format!("event-{i}")));
    }

    assert_eq!(progress.timeline.len(), TIMELINE_CAP);
    assert_eq!(progress.timeline[0].at_ms, 10);
    assert_eq!(progress.timeline[TIMELINE_CAP - 1].at_ms, TIMELINE_CAP as u64 + 9);
}

#[test]
fn merge_bounds_timeline() {
    let mut existing = JobProgress::default();
    for i in 0..TIMELINE_CAP as u64 {
        existing.push_timeline(TimelineEvent::new(i, "old"));
    }
    let mut incoming = JobProgress::default();
    incoming.push_timeline(TimelineEvent::new(999, "new"));

    let merged = existing.merge(&incoming);
    assert_eq!(merged.timeline.len(), TIMELINE_CAP);
    assert_eq!(merged.timeline[TIMELINE_CAP - 1].at_ms, 999);
}

#[test]
fn merge_unions_entities() {
    let mut existing = JobProgress::default();
    existing
        .entities
        .insert("issues".to_string(), EntityProgress { total_discovered: 50, total_processed: 20 });
    let mut incoming = JobProgress::default();
    incoming
        .entities
        .insert("issues".to_string(), EntityProgress { total_discovered: 60, total_processed: 10 });
    incoming
        .entities
        .insert("branches".to_string(), EntityProgress { total_discovered: 5, total_processed: 5 });

    let merged = existing.merge(&incoming);
    // discovered replaced, processed maxed
    assert_eq!(merged.entities["issues"], EntityProgress { total_discovered: 60, total_processed: 20 });
    assert_eq!(merged.entities["branches"], EntityProgress { total_discovered: 5, total_processed: 5 });
}

#[test]
fn retryable_is_sticky_across_merge() {
    let existing = JobProgress { retryable: true, ..JobProgress::default() };
    let incoming = JobProgress::default();

    assert!(existing.merge(&incoming).retryable);
    assert!(incoming.merge(&existing).retryable);
}

#[yare::parameterized(
    no_total       = { 10, None,      None },
    zero_total     = { 10, Some(0),   None },
    halfway        = { 50, Some(100), Some(50) },
    complete       = { 100, Some(100), Some(100) },
    rounds_up      = { 667, Some(1000), Some(67) },
    capped_at_100  = { 150, Some(100), Some(100) },
)]
fn completion_percent_is_derived(processed: u64, total: Option<u64>, expected: Option<u8>) {
    let progress = with_processed(processed, total);
    assert_eq!(progress.completion_percent(), expected);
}

#[test]
fn legacy_aliases_are_read() {
    let progress: JobProgress =
        serde_json::from_str(r#"{"processed": 12, "total": 40}"#).unwrap();

    assert_eq!(progress.processed_items, 12);
    assert_eq!(progress.total_items, Some(40));
}

#[test]
fn canonical_names_are_written() {
    let progress = with_processed(12, Some(40));
    let value = serde_json::to_value(&progress).unwrap();

    assert_eq!(value["processed_items"], 12);
    assert_eq!(value["total_items"], 40);
    assert!(value.get("processed").is_none());
    assert!(value.get("total").is_none());
}

proptest! {
    #[test]
    fn merge_never_regresses_processed(existing in arb_progress(), incoming in arb_progress()) {
        let merged = existing.merge(&incoming);
        prop_assert!(merged.processed_items >= existing.processed_items);
        prop_assert!(merged.processed_items >= incoming.processed_items);
    }

    #[test]
    fn merge_timeline_never_exceeds_cap(existing in arb_progress(), incoming in arb_progress()) {
        prop_assert!(existing.merge(&incoming).timeline.len() <= TIMELINE_CAP);
    }

    #[test]
    fn progress_serde_roundtrip(progress in arb_progress()) {
        let json = serde_json::to_string(&progress).unwrap();
        let parsed: JobProgress = serde_json::from_str(&json).unwrap();
        prop_assert_eq!(progress, parsed);
    }
}
