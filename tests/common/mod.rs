// Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use rest_queries::subscription::http::{HttpRequest, HttpResponse, Method, QueryError, Transport};
use serde_json::Value;

/// In-memory transport: answers from a route table and records every request.
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Mutex<HashMap<(Method, String), HttpResponse>>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: Method, url: &str, status: u16, data: Value) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .insert((method, url.to_string()), HttpResponse { status, data });
        self
    }

    pub fn ok(&self, method: Method, url: &str, data: Value) -> &Self {
        self.respond(method, url, 200, data)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

impl Transport for MockTransport {
    fn send(&self, request: HttpRequest) -> BoxFuture<'static, Result<HttpResponse, QueryError>> {
        let key = (request.method, request.url.clone());
        self.requests.lock().unwrap().push(request);
        let response = self.routes.lock().unwrap().get(&key).cloned();

        Box::pin(async move {
            response.ok_or_else(|| QueryError::NetworkError(format!("no route for {} {}", key.0, key.1)))
        })
    }
}
