// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test helpers and proptest strategies.
//!
//! Available to other crates' tests via the `test-support` feature.

/// Proptest strategies for core domain types.
pub mod strategies {
    use crate::job::JobStatus;
    use crate::progress::{EntityProgress, JobProgress, TimelineEvent};
    use indexmap::IndexMap;
    use proptest::prelude::*;

    pub fn arb_job_status() -> impl Strategy<Value = JobStatus> {
        prop_oneof![
            Just(JobStatus::Queued),
            Just(JobStatus::Running),
            Just(JobStatus::Finished),
            Just(JobStatus::Failed),
            Just(JobStatus::Paused),
        ]
    }

    pub fn arb_items_by_type() -> impl Strategy<Value = IndexMap<String, u64>> {
        proptest::collection::btree_map("[a-z]{1,8}", 0u64..1_000, 0..4)
            .prop_map(|m| m.into_iter().collect())
    }

    pub fn arb_timeline() -> impl Strategy<Value = Vec<TimelineEvent>> {
        proptest::collection::vec(
            (0u64..10_000_000, "[a-z_]{1,12}").prop_map(|(at_ms, event)| TimelineEvent::new(at_ms, event)),
            0..6,
        )
    }

    pub fn arb_progress() -> impl Strategy<Value = JobProgress> {
        (
            0u64..100_000,
            proptest::option::of(0u64..100_000),
            proptest::option::of("[a-z_]{1,12}".prop_map(String::from)),
            arb_items_by_type(),
            arb_timeline(),
        )
            .prop_map(|(processed_items, total_items, stage, items_by_type, timeline)| {
                JobProgress {
                    processed_items,
                    total_items,
                    stage,
                    items_by_type,
                    timeline,
                    ..JobProgress::default()
                }
            })
    }

    pub fn arb_entity_progress() -> impl Strategy<Value = EntityProgress> {
        (0u64..10_000).prop_flat_map(|discovered| {
            (Just(discovered), 0u64..=discovered).prop_map(|(total_discovered, total_processed)| {
                EntityProgress { total_discovered, total_processed }
            })
        })
    }
}
