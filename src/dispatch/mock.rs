use async_trait::async_trait;
use reqwest::Method;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use super::request::RequestBody;
use super::transport::{OutboundRequest, Transport, TransportError};

/// Scripted outcome of a single attempt
#[derive(Debug, Clone)]
pub enum MockReply {
    Body(Vec<u8>),
    /// Fail at the transport level, as a refused connection would
    Refuse,
    /// Never answer; the dispatcher's own window has to end the attempt
    Hang,
    /// Answer with `body` after sleeping
    Delayed(Duration, Vec<u8>),
}

/// An attempt observed by the mock, in arrival order
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub endpoint: String,
    pub path: String,
    pub body: RequestBody,
    pub at: Instant,
}

struct Route {
    host: Option<String>,
    path: String,
    replies: VecDeque<MockReply>,
}

/// In-memory [`Transport`] double.
///
/// Replies registered for the same route are served in order; the last one repeats. Requests
/// to a host marked unreachable, or to a path without a route, are refused.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<Vec<Route>>>,
    unreachable: Arc<Mutex<HashSet<String>>>,
    history: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for `path` on any host
    pub fn respond(&self, path: &str, body: impl Into<Vec<u8>>) -> &Self {
        self.push(None, path, MockReply::Body(body.into()))
    }

    pub fn respond_json(&self, path: &str, body: serde_json::Value) -> &Self {
        self.respond(path, body.to_string())
    }

    /// Queue a reply for `path` on one host only
    pub fn respond_on(&self, host: &str, path: &str, body: impl Into<Vec<u8>>) -> &Self {
        self.push(Some(host), path, MockReply::Body(body.into()))
    }

    pub fn reply(&self, path: &str, reply: MockReply) -> &Self {
        self.push(None, path, reply)
    }

    /// Refuse every attempt against `host`
    pub fn unreachable(&self, host: &str) -> &Self {
        self.unreachable.lock().unwrap().insert(host.to_string());
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.history.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    fn push(&self, host: Option<&str>, path: &str, reply: MockReply) -> &Self {
        let mut routes = self.routes.lock().unwrap();
        let host = host.map(str::to_string);
        match routes
            .iter_mut()
            .find(|r| r.host == host && r.path == path)
        {
            Some(route) => route.replies.push_back(reply),
            None => routes.push(Route {
                host,
                path: path.to_string(),
                replies: VecDeque::from([reply]),
            }),
        }
        self
    }

    fn next_reply(&self, endpoint: &str, path: &str) -> Option<MockReply> {
        let mut routes = self.routes.lock().unwrap();
        // A host-specific route wins over a wildcard one
        let index = routes
            .iter()
            .position(|r| r.path == path && r.host.as_deref() == Some(endpoint))
            .or_else(|| {
                routes
                    .iter()
                    .position(|r| r.path == path && r.host.is_none())
            })?;
        let route = &mut routes[index];

        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        request: &OutboundRequest<'_>,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        self.history.lock().unwrap().push(RecordedRequest {
            method: request.method.clone(),
            endpoint: request.endpoint.to_string(),
            path: request.path.to_string(),
            body: request.body.clone(),
            at: Instant::now(),
        });

        if self.unreachable.lock().unwrap().contains(request.endpoint) {
            return Err(TransportError::Refused(request.endpoint.to_string()));
        }

        match self.next_reply(request.endpoint, request.path) {
            Some(MockReply::Body(body)) => Ok(body),
            Some(MockReply::Delayed(delay, body)) => {
                tokio::time::sleep(delay).await;
                Ok(body)
            }
            Some(MockReply::Hang) => {
                std::future::pending::<()>().await;
                Err(TransportError::Refused(request.endpoint.to_string()))
            }
            Some(MockReply::Refuse) | None => {
                Err(TransportError::Refused(request.endpoint.to_string()))
            }
        }
    }
}
