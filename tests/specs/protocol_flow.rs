// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full crawl lifecycle driven through raw wire bytes.

use quarry_core::{rfc3339, Clock, ConnectionId, CrawlCommand, FakeClock, JobDraft, JobStatus};
use quarry_daemon::jobs::{JobManager, ProgressTracker};
use quarry_daemon::{
    Dispatcher, FakeTransport, HandlerConfig, HeartbeatConfig, HeartbeatMonitor, ProtocolHandler,
    RoutedMessage, Transport,
};
use quarry_storage::{JobStore, MemoryStore};
use std::sync::Arc;
use std::time::Duration;

struct World {
    handler: Arc<ProtocolHandler<FakeClock>>,
    dispatcher: Arc<Dispatcher<FakeClock>>,
    rx: tokio::sync::mpsc::Receiver<RoutedMessage>,
    store: Arc<MemoryStore<FakeClock>>,
    manager: Arc<JobManager<FakeClock>>,
    clock: FakeClock,
    connection: ConnectionId,
}

fn world() -> World {
    let clock = FakeClock::new();
    let store = Arc::new(MemoryStore::with_clock(clock.clone()));
    let dyn_store = store.clone() as Arc<dyn JobStore>;
    let transport = Arc::new(FakeTransport::new());
    let handler = Arc::new(ProtocolHandler::new(
        clock.clone(),
        HandlerConfig::default(),
        transport as Arc<dyn Transport>,
    ));
    let manager = Arc::new(JobManager::new(dyn_store.clone(), clock.clone()));
    let tracker = Arc::new(ProgressTracker::new(dyn_store.clone(), clock.clone()));
    let monitor = Arc::new(HeartbeatMonitor::new(clock.clone(), HeartbeatConfig::default()));
    let dispatcher = Arc::new(Dispatcher::new(
        handler.clone(),
        manager.clone(),
        tracker,
        monitor,
        dyn_store,
        clock.clone(),
    ));

    let rx = handler.subscribe();
    let connection = ConnectionId::generate();
    handler.open(connection.clone());
    handler.authenticate(&connection, "crawler-1");

    World { handler, dispatcher, rx, store, manager, clock, connection }
}

impl World {
    /// Feed raw bytes and apply everything that routes.
    async fn feed(&mut self, bytes: &[u8]) {
        self.handler.process_incoming(&self.connection, bytes).await.unwrap();
        while let Ok(routed) = self.rx.try_recv() {
            self.dispatcher.handle(&routed).await.unwrap();
        }
    }

    fn frame(&self, kind: &str, job_id: &str, data: serde_json::Value) -> Vec<u8> {
        let mut frame = serde_json::to_vec(&serde_json::json!({
            "type": kind,
            "timestamp": rfc3339(self.clock.epoch_ms()),
            "job_id": job_id,
            "data": data,
        }))
        .unwrap();
        frame.push(b'\n');
        frame
    }
}

#[tokio::test]
async fn crawl_job_lifecycle_end_to_end() {
    let mut w = world();
    let draft = JobDraft::builder("job-issues-1", CrawlCommand::Issues, "acct-1")
        .full_path("acme/widgets")
        .build();
    w.manager.create_job(draft).await.unwrap();

    w.feed(&w.frame("job_started", "job-issues-1", serde_json::json!({}))).await;
    assert_eq!(
        w.store.get_job("job-issues-1").await.unwrap().unwrap().status,
        JobStatus::Running
    );

    w.clock.advance(Duration::from_secs(5));
    w.feed(&w.frame(
        "job_progress",
        "job-issues-1",
        serde_json::json!({
            "overall_completion": 0.4,
            "processed_items": 40,
            "total_items": 100,
            "items_by_type": {"issues": 40},
            "resume_state": {"after": "cursor-a"},
        }),
    ))
    .await;

    w.clock.advance(Duration::from_secs(5));
    w.feed(&w.frame(
        "job_progress",
        "job-issues-1",
        serde_json::json!({
            "processed_items": 80,
            "items_by_type": {"issues": 40},
            "resume_state": {"after": "cursor-b"},
        }),
    ))
    .await;

    let job = w.store.get_job("job-issues-1").await.unwrap().unwrap();
    assert_eq!(job.progress.processed_items, 80);
    assert_eq!(job.progress.items_by_type["issues"], 80);
    assert_eq!(job.resume_state, Some(serde_json::json!({"after": "cursor-b"})));
    assert_eq!(job.progress.completion_percent(), Some(80));

    w.clock.advance(Duration::from_secs(5));
    w.feed(&w.frame("job_completed", "job-issues-1", serde_json::json!({}))).await;
    let job = w.store.get_job("job-issues-1").await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Finished);
    assert!(job.finished_at_ms.is_some());

    let stats = w.handler.stats();
    assert_eq!(stats.messages_routed, 4);
    assert!((stats.success_rate() - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn discovery_completion_spawns_dependents_from_the_wire() {
    let mut w = world();
    let id = match w.manager.ensure_discovery_job("acct-1").await.unwrap() {
        quarry_daemon::DiscoveryOutcome::Created(id) => id,
        other => panic!("expected Created, got {other:?}"),
    };

    w.feed(&w.frame("job_started", &id, serde_json::json!({}))).await;
    let completion = serde_json::json!({
        "discovered_areas": [
            {"full_path": "acme", "gitlab_id": 10, "name": "Acme", "kind": "group"},
            {"full_path": "acme/widgets", "gitlab_id": 11, "name": "Widgets", "kind": "project"},
        ],
    });
    w.feed(&w.frame("job_completed", &id, completion.clone())).await;

    let queued = w
        .store
        .find_jobs(&quarry_storage::JobFilter::with_status(JobStatus::Queued))
        .await
        .unwrap();
    let expected = quarry_core::CrawlCommand::for_area(quarry_core::AreaKind::Group).len()
        + quarry_core::CrawlCommand::for_area(quarry_core::AreaKind::Project).len()
        + quarry_core::CrawlCommand::account_globals().len();
    assert_eq!(queued.len(), expected);
    assert_eq!(w.store.area_count(), 2);

    // Replaying the completion creates nothing new
    w.clock.advance(Duration::from_secs(2));
    w.feed(&w.frame("job_completed", &id, completion)).await;
    let queued_after = w
        .store
        .find_jobs(&quarry_storage::JobFilter::with_status(JobStatus::Queued))
        .await
        .unwrap();
    assert_eq!(queued_after.len(), expected);
}

#[tokio::test]
async fn split_frames_and_garbage_do_not_derail_the_stream() {
    let mut w = world();
    let draft = JobDraft::builder("job-1", CrawlCommand::Issues, "acct-1")
        .full_path("acme/widgets")
        .build();
    w.manager.create_job(draft).await.unwrap();

    let frame = w.frame("job_started", "job-1", serde_json::json!({}));
    let (left, right) = frame.split_at(frame.len() / 2);

    // Garbage frame, then a started frame split across two reads
    w.feed(b"{oops}\n").await;
    w.feed(left).await;
    w.feed(right).await;

    assert_eq!(w.store.get_job("job-1").await.unwrap().unwrap().status, JobStatus::Running);
    let stats = w.handler.stats();
    assert_eq!(stats.parse_errors, 1);
    assert_eq!(stats.messages_routed, 1);
}
