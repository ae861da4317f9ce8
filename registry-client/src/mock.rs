//! An in-memory HTTP service for exercising the client without a registry.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::BodyExt as _;
use parking_lot::Mutex;
use url::Url;

use crate::error::BoxError;
use crate::transport::BoxFuture;

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl MockResponse {
    /// Create a canned response.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }
}

/// A request as it was received by the mock.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// The request method.
    pub method: Method,
    /// The full request URL, including the query.
    pub url: Url,
    /// The request headers.
    pub headers: HeaderMap,
    /// The collected request body.
    pub body: Bytes,
}

#[derive(Debug, Default)]
struct MockState {
    responses: HashMap<(Method, String), MockResponse>,
    requests: Vec<RecordedRequest>,
}

/// Answers requests from a table of canned responses keyed by method and
/// path, and records every request it sees.
///
/// A request with no configured response fails as a transport error.
#[derive(Debug, Default, Clone)]
pub struct MockService {
    state: Arc<Mutex<MockState>>,
}

impl MockService {
    /// An empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure a response with no headers.
    pub fn add(&self, method: Method, path: &str, status: StatusCode, body: Bytes) {
        self.add_with_headers(method, path, status, HeaderMap::new(), body);
    }

    /// Configure a response.
    pub fn add_with_headers(
        &self,
        method: Method,
        path: &str,
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    ) {
        self.state.lock().responses.insert(
            (method, path.to_owned()),
            MockResponse::new(status, headers, body),
        );
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().requests.clone()
    }

    /// The number of requests received so far.
    pub fn request_count(&self) -> usize {
        self.state.lock().requests.len()
    }
}

impl tower::Service<reqwest::Request> for MockService {
    type Response = reqwest::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: reqwest::Request) -> Self::Future {
        let state = self.state.clone();
        Box::pin(async move {
            let body = match req.body_mut().take() {
                Some(body) => body.collect().await?.to_bytes(),
                None => Bytes::new(),
            };

            let key = (req.method().clone(), req.url().path().to_owned());
            let response = {
                let mut state = state.lock();
                state.requests.push(RecordedRequest {
                    method: req.method().clone(),
                    url: req.url().clone(),
                    headers: req.headers().clone(),
                    body,
                });
                state.responses.get(&key).cloned()
            };

            let Some(response) = response else {
                return Err(format!("no response configured for {} {}", key.0, key.1).into());
            };

            let mut builder = http::Response::builder()
                .status(response.status)
                .version(http::Version::HTTP_11);
            for (name, value) in response.headers.iter() {
                builder = builder.header(name, value);
            }

            let response = builder.body(response.body)?;
            Ok(reqwest::Response::from(response))
        })
    }
}
