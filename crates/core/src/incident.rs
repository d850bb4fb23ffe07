// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incident capture for failures that must not cascade.
//!
//! A broken job-spawn must not block unrelated jobs: the failure is
//! captured with a generated ID and the offending data, logged by the
//! caller, and swallowed.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a captured incident.
    pub struct IncidentId("inc-");
}

/// A captured, non-fatal failure with its full context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub id: IncidentId,
    pub error: String,
    /// The data that was being processed when the failure occurred.
    pub context: serde_json::Value,
    pub at_ms: u64,
}

impl Incident {
    pub fn capture(error: impl Into<String>, context: serde_json::Value, at_ms: u64) -> Self {
        Self { id: IncidentId::generate(), error: error.into(), context, at_ms }
    }
}
