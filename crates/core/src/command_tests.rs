// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::area::AreaKind;

#[test]
fn group_and_project_sets_differ() {
    let groups = CrawlCommand::for_area(AreaKind::Group);
    let projects = CrawlCommand::for_area(AreaKind::Project);

    assert_ne!(groups, projects);
    // Branch/commit/pipeline crawls only make sense for projects
    assert!(!groups.contains(&CrawlCommand::Branches));
    assert!(projects.contains(&CrawlCommand::Branches));
    assert!(projects.contains(&CrawlCommand::Commits));
    // Both kinds get issue and MR crawls
    assert!(groups.contains(&CrawlCommand::Issues));
    assert!(projects.contains(&CrawlCommand::Issues));
}

#[test]
fn dependent_sets_are_path_scoped() {
    for command in CrawlCommand::for_area(AreaKind::Group) {
        assert!(command.is_path_scoped(), "{command} should be path-scoped");
    }
    for command in CrawlCommand::for_area(AreaKind::Project) {
        assert!(command.is_path_scoped(), "{command} should be path-scoped");
    }
}

#[test]
fn account_globals_are_not_path_scoped() {
    for command in CrawlCommand::account_globals() {
        assert!(!command.is_path_scoped(), "{command} should be account-global");
    }
    assert!(!CrawlCommand::AreaDiscovery.is_path_scoped());
}

#[test]
fn serde_uses_snake_case() {
    let json = serde_json::to_string(&CrawlCommand::MergeRequests).unwrap();
    assert_eq!(json, "\"merge_requests\"");

    let parsed: CrawlCommand = serde_json::from_str("\"area_discovery\"").unwrap();
    assert_eq!(parsed, CrawlCommand::AreaDiscovery);
}

#[test]
fn display_matches_wire_name() {
    assert_eq!(CrawlCommand::TimeLogs.to_string(), "time_logs");
    assert_eq!(CrawlCommand::AreaDiscovery.to_string(), "area_discovery");
}
