//! Scripted transport shared by the client integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use sitekit_client::{Transport, TransportError};

/// What the mock answers to one call.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Respond with a status and a body.
    Status(u16, &'static str),
    /// Fail at the transport level.
    Fail,
    /// Wait, then answer with the inner reply.
    Delay(Duration, Box<Reply>),
    /// Never answer.
    Hang,
}

impl Reply {
    pub fn ok(body: &'static str) -> Self {
        Reply::Status(200, body)
    }

    pub fn delayed(delay: Duration, reply: Reply) -> Self {
        Reply::Delay(delay, Box::new(reply))
    }
}

/// A request observed by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    pub method: Method,
    pub uri: String,
    pub body: Bytes,
    pub headers: http::HeaderMap,
}

/// Transport answering from a script, then from a fallback reply.
pub struct MockTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicUsize,
    seen: Mutex<Vec<Seen>>,
}

impl MockTransport {
    /// Always answers with `reply`.
    pub fn always(reply: Reply) -> Self {
        Self::scripted(Vec::new(), reply)
    }

    /// Answers with `script` in order, then with `fallback`.
    pub fn scripted(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls received.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received, in order.
    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().unwrap().clone()
    }

    fn next_reply(&self) -> Reply {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (parts, body) = request.into_parts();
        self.seen.lock().unwrap().push(Seen {
            method: parts.method,
            uri: parts.uri.to_string(),
            body,
            headers: parts.headers,
        });

        let mut reply = self.next_reply();
        loop {
            match reply {
                Reply::Status(status, body) => {
                    let mut response = http::Response::new(Bytes::from_static(body.as_bytes()));
                    *response.status_mut() = StatusCode::from_u16(status).unwrap();
                    return Ok(response);
                }
                Reply::Fail => {
                    return Err(TransportError::Connection("connection refused".into()));
                }
                Reply::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    reply = *inner;
                }
                Reply::Hang => std::future::pending::<()>().await,
            }
        }
    }
}

/// Installs a test subscriber so `tracing` output shows up on failures.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}
