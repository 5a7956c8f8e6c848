//! Mock transport for testing.
//!
//! Scripted in-memory [`HttpTransport`]. Replies are looked up by
//! `(method, path)`: queued one-shot replies first, then a route handler,
//! then a 404. Every request is recorded.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{ClientError, ClientResult};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockReply {
    Respond {
        status: u16,
        body: Value,
        delay: Duration,
    },
    Fail {
        error: ClientError,
        delay: Duration,
    },
}

impl MockReply {
    pub fn json(status: u16, body: Value) -> Self {
        MockReply::Respond {
            status,
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn status(status: u16) -> Self {
        Self::json(status, json!({ "message": format!("status {}", status) }))
    }

    pub fn fail(error: ClientError) -> Self {
        MockReply::Fail {
            error,
            delay: Duration::ZERO,
        }
    }

    /// Holds the reply back for `delay` (tokio time, so pausable).
    pub fn after(self, delay: Duration) -> Self {
        match self {
            MockReply::Respond { status, body, .. } => MockReply::Respond {
                status,
                body,
                delay,
            },
            MockReply::Fail { error, .. } => MockReply::Fail { error, delay },
        }
    }
}

type Handler = Arc<dyn Fn(&HttpRequest) -> MockReply + Send + Sync>;

struct Route {
    method: Method,
    path: String,
    queue: VecDeque<MockReply>,
    handler: Option<Handler>,
}

/// Mock transport that records requests and plays back scripted replies.
#[derive(Default)]
pub struct MockTransport {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_route<R>(&self, method: Method, path: &str, f: impl FnOnce(&mut Route) -> R) -> R {
        let mut routes = lock(&self.routes);
        let index = match routes
            .iter()
            .position(|r| r.method == method && r.path == path)
        {
            Some(index) => index,
            None => {
                routes.push(Route {
                    method,
                    path: path.to_string(),
                    queue: VecDeque::new(),
                    handler: None,
                });
                routes.len() - 1
            }
        };
        f(&mut routes[index])
    }

    /// Queues a one-shot reply for `method path`.
    pub fn push(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.with_route(method, path, |route| route.queue.push_back(reply));
        self
    }

    /// Answers every request to `method path` that has no queued reply.
    pub fn always(&self, method: Method, path: &str, reply: MockReply) -> &Self {
        self.handle(method, path, move |_| reply.clone())
    }

    /// Answers with a closure that can look at the request (e.g. its bearer).
    pub fn handle<F>(&self, method: Method, path: &str, handler: F) -> &Self
    where
        F: Fn(&HttpRequest) -> MockReply + Send + Sync + 'static,
    {
        let handler: Handler = Arc::new(handler);
        self.with_route(method, path, |route| route.handler = Some(handler));
        self
    }

    /// Every request sent so far, oldest first.
    pub fn requests(&self) -> Vec<HttpRequest> {
        lock(&self.requests).clone()
    }

    /// Number of requests sent to `method path`.
    pub fn count(&self, method: Method, path: &str) -> usize {
        lock(&self.requests)
            .iter()
            .filter(|r| r.method == method && r.path == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Drains and returns the recorded requests.
    pub fn take_requests(&self) -> Vec<HttpRequest> {
        std::mem::take(&mut *lock(&self.requests))
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> ClientResult<HttpResponse> {
        lock(&self.requests).push(request.clone());

        let reply = {
            let mut routes = lock(&self.routes);
            routes
                .iter_mut()
                .find(|r| r.method == request.method && r.path == request.path)
                .and_then(|route| match route.queue.pop_front() {
                    Some(reply) => Some(reply),
                    None => route.handler.as_ref().map(|h| h(&request)),
                })
        };

        let reply = reply.unwrap_or_else(|| {
            MockReply::json(
                404,
                json!({ "message": format!("no mock for {} {}", request.method, request.path) }),
            )
        });

        match reply {
            MockReply::Respond {
                status,
                body,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(HttpResponse::new(status, body))
            }
            MockReply::Fail { error, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Err(error)
            }
        }
    }
}
