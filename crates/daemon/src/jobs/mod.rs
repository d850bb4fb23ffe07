// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Job lifecycle: creation, dependency-driven spawning, progress
//! merging, and recovery.

mod manager;
mod progress;
mod recovery;

pub use manager::{
    DiscoveryOutcome, JobManager, ManagerError, SpawnOutcome, SpawnSummary, DISCOVERY_COOLDOWN_MS,
};
pub use progress::ProgressTracker;
pub use recovery::{
    recovery_kinds, JobRecovery, RecoveryConfig, RecoveryKind, RecoveryReport, RecoveryResponse,
    STUCK_JOB_REASON,
};
