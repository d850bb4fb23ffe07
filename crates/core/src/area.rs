// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Discovered GitLab groups and projects.

use serde::{Deserialize, Serialize};

/// Kind of a discovered area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaKind {
    Group,
    Project,
}

crate::simple_display! {
    AreaKind {
        Group => "group",
        Project => "project",
    }
}

/// A discovered GitLab group or project, identified by its full path.
///
/// Created once per discovered area (insert-or-ignore on `full_path`),
/// read-mostly afterward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Area {
    pub full_path: String,
    pub gitlab_id: u64,
    pub name: String,
    pub kind: AreaKind,
}

impl Area {
    pub fn new(full_path: impl Into<String>, gitlab_id: u64, name: impl Into<String>, kind: AreaKind) -> Self {
        Self { full_path: full_path.into(), gitlab_id, name: name.into(), kind }
    }
}
