// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP listener for crawler worker connections.
//!
//! Connections start with a one-line JSON handshake (token, crawler id,
//! protocol version); after a successful handshake the connection is a
//! newline-delimited message stream in both directions.

use crate::heartbeat::HeartbeatMonitor;
use crate::protocol::{ProtocolError, ProtocolHandler, SocketTransport};
use quarry_core::{Clock, ConnectionId};
use quarry_wire::{check_version, FrameError, VersionCheck, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Outbound channel depth per connection.
const WRITE_BUFFER: usize = 64;

/// Read chunk size for the message stream.
const READ_CHUNK: usize = 8 * 1024;

/// First line a worker sends after connecting.
#[derive(Debug, Deserialize)]
struct Hello {
    crawler_id: String,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    version: Option<String>,
}

/// Handshake reply.
#[derive(Debug, Serialize)]
struct HelloReply<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggested_version: Option<&'a str>,
    version: &'a str,
}

impl<'a> HelloReply<'a> {
    fn accepted() -> Self {
        Self { ok: true, error: None, suggested_version: None, version: PROTOCOL_VERSION }
    }

    fn rejected(error: &'a str, suggested_version: Option<&'a str>) -> Self {
        Self { ok: false, error: Some(error), suggested_version, version: PROTOCOL_VERSION }
    }
}

pub struct Listener<C: Clock> {
    handler: Arc<ProtocolHandler<C>>,
    monitor: Arc<HeartbeatMonitor<C>>,
    transport: Arc<SocketTransport>,
    auth_token: Option<String>,
}

impl<C: Clock + 'static> Listener<C> {
    pub fn new(
        handler: Arc<ProtocolHandler<C>>,
        monitor: Arc<HeartbeatMonitor<C>>,
        transport: Arc<SocketTransport>,
        auth_token: Option<String>,
    ) -> Self {
        Self { handler, monitor, transport, auth_token }
    }

    /// Accept connections until cancellation, one task per connection.
    pub async fn run(self: Arc<Self>, listener: TcpListener, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("listener stopping");
                    break;
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            debug!(%addr, "worker connection accepted");
                            let listener = Arc::clone(&self);
                            let cancel = cancel.clone();
                            tokio::spawn(async move {
                                listener.serve(stream, cancel).await;
                            });
                        }
                        Err(e) => error!(error = %e, "accept failed"),
                    }
                }
            }
        }
    }

    async fn serve(&self, stream: TcpStream, cancel: CancellationToken) {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        // Handshake: one JSON line before the message stream
        let mut line = String::new();
        if reader.read_line(&mut line).await.is_err() || line.is_empty() {
            return;
        }
        let hello: Hello = match serde_json::from_str(line.trim_end()) {
            Ok(hello) => hello,
            Err(e) => {
                warn!(error = %e, "malformed handshake");
                let _ = write_reply(&mut writer, &HelloReply::rejected("malformed handshake", None))
                    .await;
                return;
            }
        };

        if let Some(ref expected) = self.auth_token {
            if hello.token.as_deref() != Some(expected.as_str()) {
                warn!(crawler_id = %hello.crawler_id, "handshake rejected: bad token");
                let _ = write_reply(&mut writer, &HelloReply::rejected("unauthorized", None)).await;
                return;
            }
        }

        if let Some(ref version) = hello.version {
            if let VersionCheck::NotSupported { suggested } = check_version(version) {
                warn!(crawler_id = %hello.crawler_id, version, "handshake rejected: unsupported version");
                let _ = write_reply(
                    &mut writer,
                    &HelloReply::rejected("unsupported protocol version", Some(suggested)),
                )
                .await;
                return;
            }
        }

        let connection = ConnectionId::generate();
        info!(connection = %connection, crawler_id = %hello.crawler_id, "worker connected");
        self.handler.open(connection.clone());
        self.handler.authenticate(&connection, hello.crawler_id);
        self.monitor.track(connection.clone());

        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(WRITE_BUFFER);
        self.transport.register(connection.clone(), tx.clone());

        let writer_task = tokio::spawn(async move {
            if write_reply(&mut writer, &HelloReply::accepted()).await.is_err() {
                return;
            }
            while let Some(frame) = rx.recv().await {
                if writer.write_all(&frame).await.is_err() {
                    break;
                }
            }
            let _ = writer.shutdown().await;
        });

        self.read_loop(&connection, &mut reader, cancel).await;

        info!(connection = %connection, "worker disconnected");
        self.transport.unregister(&connection);
        self.monitor.untrack(&connection);
        self.handler.close(&connection);
        drop(tx);
        let _ = writer_task.await;
    }

    async fn read_loop<R>(
        &self,
        connection: &ConnectionId,
        reader: &mut R,
        cancel: CancellationToken,
    ) where
        R: AsyncReadExt + Unpin,
    {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => break,
                read = reader.read(&mut buf) => read,
            };
            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(connection = %connection, error = %e, "read failed");
                    break;
                }
            };

            match self.handler.process_incoming(connection, &buf[..n]).await {
                Ok(summary) => {
                    if let Some(delay) = summary.backpressure {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(ProtocolError::Frame(FrameError::Overflow { .. })) => {
                    // Last-resort parse of the partial buffer, then close
                    warn!(connection = %connection, "frame buffer overflow; closing connection");
                    let _ = self.handler.force_flush(connection).await;
                    break;
                }
                Err(e) => {
                    warn!(connection = %connection, error = %e, "connection error");
                    break;
                }
            }
        }
    }
}

async fn write_reply<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    reply: &HelloReply<'_>,
) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(reply).map_err(std::io::Error::other)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await
}

#[cfg(test)]
#[path = "listener_tests.rs"]
mod tests;
