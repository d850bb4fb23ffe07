// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! quarryd: crawler-coordination daemon.

use quarry_core::SystemClock;
use quarry_daemon::jobs::{JobManager, JobRecovery, ProgressTracker, RecoveryConfig};
use quarry_daemon::{
    env, Dispatcher, HandlerConfig, HeartbeatConfig, HeartbeatMonitor, Listener, ProtocolHandler,
    SocketTransport, Transport,
};
use quarry_storage::{JobStore, MemoryStore};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let file_appender = tracing_appender::rolling::daily(env::log_dir(), "quarryd.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("QUARRY_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .init();

    let clock = SystemClock;
    // The relational store is an external deployment concern; the daemon
    // runs self-contained on the in-memory store until one is wired in.
    let store: Arc<dyn JobStore> = Arc::new(MemoryStore::new());

    let transport = Arc::new(SocketTransport::new());
    let handler = Arc::new(ProtocolHandler::new(
        clock.clone(),
        HandlerConfig {
            frame_capacity: env::frame_buffer_bytes(),
            max_frame_bytes: env::frame_buffer_bytes(),
            max_message_bytes: env::max_message_bytes(),
        },
        transport.clone() as Arc<dyn Transport>,
    ));
    let monitor = Arc::new(HeartbeatMonitor::new(
        clock.clone(),
        HeartbeatConfig { timeout: env::heartbeat_timeout(), ..HeartbeatConfig::default() },
    ));
    let manager = Arc::new(JobManager::new(store.clone(), clock.clone()));
    let tracker = Arc::new(ProgressTracker::new(store.clone(), clock.clone()));
    let recovery = Arc::new(JobRecovery::new(
        store.clone(),
        clock.clone(),
        RecoveryConfig { interval: env::recovery_interval(), ..RecoveryConfig::default() },
    ));

    let cancel = CancellationToken::new();

    let dispatcher = Arc::new(Dispatcher::new(
        handler.clone(),
        manager.clone(),
        tracker,
        monitor.clone(),
        store,
        clock.clone(),
    ));
    let dispatch_task = dispatcher.start(handler.subscribe(), cancel.clone());

    // Dead connections are disconnected at the transport and forgotten
    let (dead_tx, mut dead_rx) = mpsc::channel(64);
    let monitor_task = monitor.start(cancel.clone(), dead_tx);
    let reaper = {
        let handler = handler.clone();
        let transport = transport.clone();
        tokio::spawn(async move {
            while let Some(connection) = dead_rx.recv().await {
                warn!(connection = %connection, "disconnecting dead connection");
                transport.disconnect(&connection);
                handler.close(&connection);
            }
        })
    };

    let recovery_task = recovery.start(cancel.clone());

    let port = env::tcp_port();
    let socket = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "quarryd listening for workers");
    let listener = Arc::new(Listener::new(handler, monitor, transport, env::auth_token()));
    let listener_task = tokio::spawn(listener.run(socket, cancel.clone()));

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    cancel.cancel();

    let _ = listener_task.await;
    let _ = recovery_task.await;
    let _ = monitor_task.await;
    let _ = dispatch_task.await;
    reaper.abort();

    Ok(())
}
