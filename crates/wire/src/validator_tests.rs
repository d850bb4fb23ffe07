// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::message::{
    Body, HeartbeatData, JobAssignmentData, JobProgressData, JobStartedData, Message,
    ShutdownData, TokenRefreshRequestData, TokenRefreshResponseData,
};
use crate::parser::ParsedMessage;
use quarry_core::{EntityProgress, JobProgress, SystemStatus};

const NOW_MS: u64 = 1_770_000_000_000;
const TS: &str = "2026-02-01T10:00:00Z";

fn parsed(message: Message) -> ParsedMessage {
    let kind = message.kind().to_string();
    ParsedMessage { message, kind, frame_len: 64 }
}

fn ctx() -> ValidationCtx {
    ValidationCtx { now_ms: NOW_MS, last_heartbeat_ms: None }
}

fn heartbeat(active_jobs: i64) -> Message {
    Message::new(
        Body::Heartbeat(HeartbeatData { system_status: SystemStatus::Idle, active_jobs }),
        TS,
    )
}

fn progress_message(completion: Option<f64>) -> Message {
    Message::with_job_id(
        Body::JobProgress(JobProgressData {
            overall_completion: completion,
            ..Default::default()
        }),
        TS,
        "job-1",
    )
}

#[test]
fn valid_heartbeat_passes() {
    let validator = MessageValidator::default();
    assert!(validator.validate(&parsed(heartbeat(3)), &ctx()).is_ok());
}

#[test]
fn negative_active_jobs_rejected() {
    let validator = MessageValidator::default();
    let err = validator.validate(&parsed(heartbeat(-1)), &ctx()).unwrap_err();
    assert_eq!(err, ValidationError::NegativeActiveJobs(-1));
}

#[yare::parameterized(
    too_soon    = { 500,  false },
    at_minimum  = { 1000, true },
    spaced_out  = { 1500, true },
)]
fn heartbeat_rate_limit(elapsed_ms: u64, accepted: bool) {
    let validator = MessageValidator::default();
    let ctx = ValidationCtx { now_ms: NOW_MS, last_heartbeat_ms: Some(NOW_MS - elapsed_ms) };

    let result = validator.validate(&parsed(heartbeat(0)), &ctx);
    assert_eq!(result.is_ok(), accepted, "elapsed {elapsed_ms}ms");
    if !accepted {
        assert!(matches!(result, Err(ValidationError::HeartbeatTooFrequent { .. })));
    }
}

#[test]
fn first_heartbeat_has_no_rate_limit() {
    let validator = MessageValidator::default();
    assert!(validator.validate(&parsed(heartbeat(0)), &ctx()).is_ok());
}

#[yare::parameterized(
    zero          = { 0.0,    true },
    halfway       = { 0.5,    true },
    exactly_one   = { 1.0,    true },
    just_over     = { 1.0001, false },
    negative      = { -0.1,   false },
)]
fn completion_boundary(completion: f64, accepted: bool) {
    let validator = MessageValidator::default();
    let result = validator.validate(&parsed(progress_message(Some(completion))), &ctx());
    assert_eq!(result.is_ok(), accepted, "completion {completion}");
}

#[test]
fn entity_counts_boundary() {
    let validator = MessageValidator::default();

    let mut ok_progress = JobProgress::default();
    ok_progress
        .entities
        .insert("issues".to_string(), EntityProgress { total_discovered: 10, total_processed: 10 });
    let message = Message::with_job_id(
        Body::JobProgress(JobProgressData { progress: ok_progress, ..Default::default() }),
        TS,
        "job-1",
    );
    assert!(validator.validate(&parsed(message), &ctx()).is_ok());

    let mut bad_progress = JobProgress::default();
    bad_progress
        .entities
        .insert("issues".to_string(), EntityProgress { total_discovered: 10, total_processed: 11 });
    let message = Message::with_job_id(
        Body::JobProgress(JobProgressData { progress: bad_progress, ..Default::default() }),
        TS,
        "job-1",
    );
    let err = validator.validate(&parsed(message), &ctx()).unwrap_err();
    assert!(matches!(err, ValidationError::EntityCountsInconsistent { .. }));
}

#[yare::parameterized(
    missing  = { None,            false },
    short    = { Some("ab"),      false },
    exact    = { Some("abc"),     true },
    normal   = { Some("job-42"),  true },
)]
fn job_started_requires_job_id(job_id: Option<&str>, accepted: bool) {
    let validator = MessageValidator::default();
    let mut message = Message::new(Body::JobStarted(JobStartedData::default()), TS);
    message.job_id = job_id.map(String::from);

    assert_eq!(validator.validate(&parsed(message), &ctx()).is_ok(), accepted);
}

#[test]
fn token_refresh_request_requires_job_id() {
    let validator = MessageValidator::default();

    let without = Message::new(Body::TokenRefreshRequest(TokenRefreshRequestData::default()), TS);
    assert!(matches!(
        validator.validate(&parsed(without), &ctx()),
        Err(ValidationError::MissingJobId { .. })
    ));

    let with = Message::with_job_id(
        Body::TokenRefreshRequest(TokenRefreshRequestData::default()),
        TS,
        "job-1",
    );
    assert!(validator.validate(&parsed(with), &ctx()).is_ok());
}

fn assignment(token: &str, host: &str) -> Message {
    Message::with_job_id(
        Body::JobAssignment(JobAssignmentData {
            command: quarry_core::CrawlCommand::Issues,
            access_token: token.to_string(),
            gitlab_host: host.to_string(),
            graphql_endpoint: None,
            full_path: Some("acme/widgets".to_string()),
            branch: None,
            resume_state: None,
        }),
        TS,
        "job-1",
    )
}

#[test]
fn outbound_assignment_rules() {
    let validator = MessageValidator::default();

    assert!(validator
        .validate_outbound(&assignment("glpat-0123456789", "https://gitlab.example.com"), &ctx())
        .is_ok());

    assert_eq!(
        validator.validate_outbound(&assignment("short", "https://gitlab.example.com"), &ctx()),
        Err(ValidationError::AccessTokenTooShort)
    );

    assert!(matches!(
        validator.validate_outbound(&assignment("glpat-0123456789", "not a url"), &ctx()),
        Err(ValidationError::InvalidHost { .. })
    ));
}

#[test]
fn refresh_response_needs_token_when_successful() {
    let validator = MessageValidator::default();

    let bad = Message::new(
        Body::TokenRefreshResponse(TokenRefreshResponseData {
            refresh_successful: true,
            access_token: None,
        }),
        TS,
    );
    assert_eq!(validator.validate(&parsed(bad), &ctx()), Err(ValidationError::MissingAccessToken));

    let failed_refresh = Message::new(
        Body::TokenRefreshResponse(TokenRefreshResponseData {
            refresh_successful: false,
            access_token: None,
        }),
        TS,
    );
    assert!(validator.validate(&parsed(failed_refresh), &ctx()).is_ok());
}

#[yare::parameterized(
    absent   = { None,     true },
    zero     = { Some(0),  true },
    positive = { Some(30), true },
    negative = { Some(-1), false },
)]
fn shutdown_timeout_rule(timeout: Option<i64>, accepted: bool) {
    let validator = MessageValidator::default();
    let message = Message::new(
        Body::Shutdown(ShutdownData { timeout_seconds: timeout, reason: None }),
        TS,
    );
    assert_eq!(validator.validate(&parsed(message), &ctx()).is_ok(), accepted);
}

#[test]
fn unknown_type_is_rejected_with_kind() {
    let validator = MessageValidator::default();
    let message = Message::new(Body::Unknown, TS);
    let mut parsed = parsed(message);
    parsed.kind = "telemetry_blob".to_string();

    assert_eq!(
        validator.validate(&parsed, &ctx()),
        Err(ValidationError::UnknownType { kind: "telemetry_blob".to_string() })
    );
}

#[test]
fn secondary_size_check_fires() {
    let validator = MessageValidator::new(32);
    let mut oversized = parsed(heartbeat(0));
    oversized.frame_len = 33;

    assert_eq!(
        validator.validate(&oversized, &ctx()),
        Err(ValidationError::Oversized { size: 33, max: 32 })
    );
}
