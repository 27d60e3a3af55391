// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent polling client for the coordinator and VLANd

use crate::codec::{self, CodecError};
use lava_core::{ErrorKind, LavaError};
use serde_json::Value;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;

/// Connection state of a [`PollClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Ready,
    /// A network failure happened; only [`PollClient::reset`] recovers
    Faulted,
}

/// One persistent socket carrying framed requests.
///
/// Connects on first use. After a network failure the client stays
/// faulted until it is reset at a retry boundary, so a blocking wait never
/// reconnects behind the caller's back.
pub struct PollClient {
    protocol: String,
    host: String,
    port: u16,
    poll_delay: Duration,
    state: ClientState,
    stream: Option<TcpStream>,
}

impl PollClient {
    pub fn new(protocol: &str, host: &str, port: u16, poll_delay: Duration) -> Self {
        Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            poll_delay,
            state: ClientState::Disconnected,
            stream: None,
        }
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn endpoint(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    pub fn set_poll_delay(&mut self, delay: Duration) {
        self.poll_delay = delay;
    }

    pub fn poll_delay(&self) -> Duration {
        self.poll_delay
    }

    /// Point the client elsewhere, dropping any connection
    pub fn retarget(&mut self, host: &str, port: u16, poll_delay: Duration) {
        self.host = host.to_string();
        self.port = port;
        self.poll_delay = poll_delay;
        self.stream = None;
        self.state = ClientState::Disconnected;
    }

    pub async fn connect(&mut self) -> Result<(), LavaError> {
        self.state = ClientState::Connecting;
        match TcpStream::connect((self.host.as_str(), self.port)).await {
            Ok(stream) => {
                tracing::debug!(protocol = %self.protocol, host = %self.host, port = self.port, "connected");
                self.stream = Some(stream);
                self.state = ClientState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = ClientState::Faulted;
                Err(LavaError::infrastructure(format!(
                    "Unable to connect to {} service at {}:{}: {}",
                    self.protocol, self.host, self.port, e
                )))
            }
        }
    }

    /// Send `message` until the service answers with something other than
    /// `wait`, or until `timeout` has passed.
    pub async fn poll(&mut self, message: &Value, timeout: Duration) -> Result<Value, LavaError> {
        let frame = codec::encode_request(message)?;
        match self.state {
            ClientState::Ready => {}
            ClientState::Disconnected => self.connect().await?,
            ClientState::Connecting | ClientState::Faulted => {
                return Err(LavaError::infrastructure(format!(
                    "{} connection is faulted",
                    self.protocol
                )))
            }
        }

        let request = message.get("request").and_then(Value::as_str).unwrap_or("");
        tracing::debug!(
            protocol = %self.protocol,
            request,
            timeout_secs = timeout.as_secs(),
            "polling {}:{}",
            self.host,
            self.port
        );
        let deadline = Instant::now().checked_add(timeout).ok_or_else(|| {
            LavaError::job(format!("Invalid {} timeout {:?}", self.protocol, timeout))
        })?;
        loop {
            let reply = match tokio::time::timeout_at(deadline, self.exchange(&frame)).await {
                Ok(reply) => reply?,
                Err(_) => {
                    // a half-read frame leaves the stream unusable
                    self.fault();
                    return Err(self.timed_out(timeout));
                }
            };
            if reply.get("response").and_then(Value::as_str) != Some("wait") {
                return Ok(reply);
            }
            if tokio::time::timeout_at(deadline, tokio::time::sleep(self.poll_delay))
                .await
                .is_err()
            {
                return Err(self.timed_out(timeout));
            }
        }
    }

    /// Drop a faulted connection so the next poll reconnects
    pub fn reset(&mut self) {
        if self.state == ClientState::Faulted {
            tracing::info!(protocol = %self.protocol, "resetting faulted connection");
            self.stream = None;
            self.state = ClientState::Disconnected;
        }
    }

    pub async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.state = ClientState::Disconnected;
    }

    async fn exchange(&mut self, frame: &[u8]) -> Result<Value, LavaError> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(LavaError::infrastructure(format!(
                "{} connection is not open",
                self.protocol
            )));
        };
        match round_trip(stream, frame).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => {
                self.fault();
                Err(LavaError::infrastructure(format!(
                    "{} service closed the connection",
                    self.protocol
                )))
            }
            Err(e) => {
                self.fault();
                Err(e.into())
            }
        }
    }

    fn fault(&mut self) {
        self.stream = None;
        self.state = ClientState::Faulted;
    }

    /// Protocol waits fail the job rather than the infrastructure
    fn timed_out(&self, timeout: Duration) -> LavaError {
        LavaError::Timeout {
            name: format!("protocol {}", self.protocol),
            elapsed: timeout.as_secs(),
            exception: ErrorKind::Job,
        }
    }
}

async fn round_trip(stream: &mut TcpStream, frame: &[u8]) -> Result<Option<Value>, CodecError> {
    stream.write_all(frame).await?;
    stream.flush().await?;
    codec::read_message(stream).await
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
