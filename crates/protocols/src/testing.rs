// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process stand-in for the coordinator and VLANd services

use crate::codec;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

type Handler = dyn Fn(&Value) -> Option<Value> + Send + Sync;

/// Answers every framed request with `handler`; `None` closes the connection
pub(crate) struct FakeService {
    port: u16,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl FakeService {
    pub(crate) async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<Handler> = Arc::new(handler);
        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let log = Arc::clone(&log);
                tokio::spawn(async move {
                    while let Ok(Some(request)) = codec::read_message(&mut stream).await {
                        log.lock().unwrap().push(request.clone());
                        match handler(&request) {
                            Some(reply) => codec::write_message(&mut stream, &reply).await.unwrap(),
                            None => break,
                        }
                    }
                });
            }
        });
        Self { port, requests }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    pub(crate) fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

/// A local port with nothing listening on it
pub(crate) async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
