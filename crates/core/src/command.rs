// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Crawl command kinds and the dependent-job fan-out tables.

use crate::area::AreaKind;
use serde::{Deserialize, Serialize};

/// An enumerated crawl task kind.
///
/// `AreaDiscovery` is the distinguished per-account job that scans the
/// account's accessible groups and projects; its completion drives the
/// dependent fan-out below. Path-scoped commands operate on one area
/// (group or project); account-global commands have no `full_path`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlCommand {
    AreaDiscovery,
    Issues,
    MergeRequests,
    Branches,
    Commits,
    Pipelines,
    Releases,
    Milestones,
    Members,
    Users,
    Vulnerabilities,
    TimeLogs,
}

crate::simple_display! {
    CrawlCommand {
        AreaDiscovery => "area_discovery",
        Issues => "issues",
        MergeRequests => "merge_requests",
        Branches => "branches",
        Commits => "commits",
        Pipelines => "pipelines",
        Releases => "releases",
        Milestones => "milestones",
        Members => "members",
        Users => "users",
        Vulnerabilities => "vulnerabilities",
        TimeLogs => "time_logs",
    }
}

/// Dependent commands spawned for each discovered group.
const GROUP_COMMANDS: &[CrawlCommand] = &[
    CrawlCommand::Issues,
    CrawlCommand::MergeRequests,
    CrawlCommand::Milestones,
    CrawlCommand::Members,
];

/// Dependent commands spawned for each discovered project.
const PROJECT_COMMANDS: &[CrawlCommand] = &[
    CrawlCommand::Issues,
    CrawlCommand::MergeRequests,
    CrawlCommand::Branches,
    CrawlCommand::Commits,
    CrawlCommand::Pipelines,
    CrawlCommand::Releases,
    CrawlCommand::Members,
];

/// Account-global commands spawned once per account per discovery cycle.
const ACCOUNT_COMMANDS: &[CrawlCommand] = &[
    CrawlCommand::Users,
    CrawlCommand::Vulnerabilities,
    CrawlCommand::TimeLogs,
];

impl CrawlCommand {
    /// Fixed dependent command set for a discovered area of the given kind.
    pub fn for_area(kind: AreaKind) -> &'static [CrawlCommand] {
        match kind {
            AreaKind::Group => GROUP_COMMANDS,
            AreaKind::Project => PROJECT_COMMANDS,
        }
    }

    /// Account-global commands spawned alongside the area fan-out.
    pub fn account_globals() -> &'static [CrawlCommand] {
        ACCOUNT_COMMANDS
    }

    /// Whether jobs for this command are scoped to an area `full_path`.
    pub fn is_path_scoped(self) -> bool {
        !matches!(
            self,
            CrawlCommand::AreaDiscovery
                | CrawlCommand::Users
                | CrawlCommand::Vulnerabilities
                | CrawlCommand::TimeLogs
        )
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
