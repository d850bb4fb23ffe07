// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Applies routed messages to the job components.
//!
//! One dispatcher task per backend instance: it drains the subscriber
//! channel in wire order per connection and issues the resulting store
//! writes. Failures are counted as processing errors; the connection and
//! the dispatcher both survive.

use crate::heartbeat::HeartbeatMonitor;
use crate::jobs::{JobManager, ManagerError, ProgressTracker};
use crate::protocol::{ProtocolError, ProtocolHandler, RoutedMessage};
use quarry_core::Clock;
use quarry_storage::{JobStore, StoreError};
use quarry_wire::{Body, Message, TokenRefreshResponseData};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Manager(#[from] ManagerError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("message `{kind}` has no job_id")]
    MissingJobId { kind: &'static str },
}

pub struct Dispatcher<C: Clock> {
    handler: Arc<ProtocolHandler<C>>,
    manager: Arc<JobManager<C>>,
    tracker: Arc<ProgressTracker<C>>,
    monitor: Arc<HeartbeatMonitor<C>>,
    store: Arc<dyn JobStore>,
    clock: C,
}

impl<C: Clock + 'static> Dispatcher<C> {
    pub fn new(
        handler: Arc<ProtocolHandler<C>>,
        manager: Arc<JobManager<C>>,
        tracker: Arc<ProgressTracker<C>>,
        monitor: Arc<HeartbeatMonitor<C>>,
        store: Arc<dyn JobStore>,
        clock: C,
    ) -> Self {
        Self { handler, manager, tracker, monitor, store, clock }
    }

    /// Drain the subscriber channel until cancellation.
    pub fn start(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<RoutedMessage>,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("dispatcher stopping");
                        break;
                    }
                    routed = rx.recv() => {
                        let Some(routed) = routed else { break };
                        if let Err(e) = self.handle(&routed).await {
                            warn!(
                                connection = %routed.connection,
                                kind = routed.message.kind(),
                                error = %e,
                                "dispatch failed"
                            );
                            self.handler.note_processing_error(&routed.connection, &e.to_string());
                        }
                    }
                }
            }
        })
    }

    /// Apply one validated message.
    pub async fn handle(&self, routed: &RoutedMessage) -> Result<(), DispatchError> {
        match &routed.message.body {
            Body::Heartbeat(_) => {
                self.monitor.record_heartbeat(&routed.connection);
                Ok(())
            }

            Body::JobStarted(_) => {
                let job_id = require_job_id(&routed.message, "job_started")?;
                self.manager.mark_started(job_id).await?;
                Ok(())
            }

            Body::JobProgress(data) => {
                let job_id = require_job_id(&routed.message, "job_progress")?;
                self.tracker.apply(job_id, data).await?;
                Ok(())
            }

            Body::JobCompleted(data) => {
                let job_id = require_job_id(&routed.message, "job_completed")?;
                self.manager.complete_job(job_id, data).await?;
                Ok(())
            }

            Body::JobFailed(data) => {
                let job_id = require_job_id(&routed.message, "job_failed")?;
                self.manager.fail_job(job_id, data).await?;
                Ok(())
            }

            Body::TokenRefreshRequest(_) => {
                let job_id = require_job_id(&routed.message, "token_refresh_request")?;
                let token = match self.store.get_job(job_id).await? {
                    Some(job) => self.store.find_account_token(&job.account_id).await?,
                    None => {
                        warn!(job_id, "token refresh for unknown job");
                        None
                    }
                };
                let response = Message::with_job_id(
                    Body::TokenRefreshResponse(TokenRefreshResponseData {
                        refresh_successful: token.is_some(),
                        access_token: token,
                    }),
                    self.clock.timestamp(),
                    job_id,
                );
                self.handler.send(&routed.connection, &response).await?;
                Ok(())
            }

            // Backend→crawler types arriving inbound are dropped
            Body::JobAssignment(_) | Body::TokenRefreshResponse(_) | Body::Shutdown(_) => {
                warn!(
                    connection = %routed.connection,
                    kind = routed.message.kind(),
                    "outbound-only message received from worker; ignoring"
                );
                Ok(())
            }

            // The validator rejects unknown types before routing
            Body::Unknown => Ok(()),
        }
    }
}

fn require_job_id<'a>(message: &'a Message, kind: &'static str) -> Result<&'a str, DispatchError> {
    message.job_id.as_deref().ok_or(DispatchError::MissingJobId { kind })
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
