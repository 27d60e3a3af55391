// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! TCP server and connection handling.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use lava_protocols::codec::{self, CodecError};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::group::Coordinator;

/// Listening coordinator
pub struct Server {
    listener: TcpListener,
    state: Arc<Mutex<Coordinator>>,
    blocksize: usize,
}

impl Server {
    pub async fn bind(config: &Config) -> Result<Self, ServerError> {
        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .map_err(|e| ServerError::Bind(format!("{}:{}", config.host, config.port), e))?;
        Ok(Self {
            listener,
            state: Arc::new(Mutex::new(Coordinator::new())),
            blocksize: config.blocksize.max(1),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared group state
    pub fn state(&self) -> Arc<Mutex<Coordinator>> {
        Arc::clone(&self.state)
    }

    /// Accept connections until `shutdown` resolves
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) -> Result<(), ServerError> {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted connection");
                            let (reader, writer) = stream.into_split();
                            let reader = BufReader::with_capacity(self.blocksize, reader);
                            let state = Arc::clone(&self.state);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(reader, writer, state).await {
                                    error!(%peer, "Error handling connection: {}", e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Error accepting connection: {}", e);
                        }
                    }
                }

                _ = &mut shutdown => {
                    info!("Coordinator shutting down");
                    return Ok(());
                }
            }
        }
    }
}

/// Answer framed requests until the peer closes the stream
pub async fn handle_connection<R, W>(
    mut reader: R,
    mut writer: W,
    state: Arc<Mutex<Coordinator>>,
) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        let reply = match codec::read_message(&mut reader).await {
            Ok(Some(request)) => {
                debug!(%request, "Received request");
                let mut coordinator = state.lock().unwrap_or_else(|e| e.into_inner());
                coordinator.handle(&request)
            }
            Ok(None) => {
                debug!("Client disconnected");
                return Ok(());
            }
            // the body was consumed, so the stream is still framed
            Err(CodecError::Json(e)) => {
                warn!("Invalid JSON request: {}", e);
                json!({"response": "nack"})
            }
            Err(e) => return Err(e.into()),
        };
        debug!(%reply, "Sending response");
        codec::write_message(&mut writer, &reply).await?;
    }
}

/// Server errors
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {0}: {1}")]
    Bind(String, #[source] std::io::Error),

    #[error("Protocol error: {0}")]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[path = "server_tests.rs"]
mod tests;
