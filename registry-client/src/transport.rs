//! The request/response seam between the protocol layer and the HTTP stack.
//!
//! Anything implementing [`tower::Service`] over [`reqwest`] requests can be
//! used as the transport, including [`reqwest::Client`] itself.

use std::future::Future;
use std::pin::Pin;

use http::header::{HeaderName, HeaderValue};
use http::Method;
use tower::ServiceExt as _;
use url::Url;

use crate::authentication::{Authentication, NoAuthentication};
use crate::error::{BoxError, HttpResponseError, RegistryError};
use crate::headers::Headers;
use crate::response::RegistryResponse;

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// An HTTP service able to execute registry requests.
///
/// This is implemented for every cloneable [`tower::Service`] which accepts a
/// [`reqwest::Request`] and produces a [`reqwest::Response`].
pub trait HttpService: Clone + Send + Sync + 'static {
    /// Execute a single request.
    fn execute(
        &self,
        request: reqwest::Request,
    ) -> BoxFuture<'static, Result<reqwest::Response, BoxError>>;
}

impl<S> HttpService for S
where
    S: tower::Service<reqwest::Request, Response = reqwest::Response>
        + Clone
        + Send
        + Sync
        + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
{
    fn execute(
        &self,
        request: reqwest::Request,
    ) -> BoxFuture<'static, Result<reqwest::Response, BoxError>> {
        let service = self.clone();
        Box::pin(async move { service.oneshot(request).await.map_err(Into::into) })
    }
}

/// A request to be sent to a registry.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Option<reqwest::Body>,
}

impl Request {
    /// Create a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: None,
        }
    }

    /// A `GET` request.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A `HEAD` request.
    pub fn head(url: Url) -> Self {
        Self::new(Method::HEAD, url)
    }

    /// A `POST` request.
    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// A `PATCH` request.
    pub fn patch(url: Url) -> Self {
        Self::new(Method::PATCH, url)
    }

    /// A `PUT` request.
    pub fn put(url: Url) -> Self {
        Self::new(Method::PUT, url)
    }

    /// A `DELETE` request.
    pub fn delete(url: Url) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Add a single header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Add a list of headers, after any already present.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set the request body.
    pub fn body<B: Into<reqwest::Body>>(mut self, body: B) -> Self {
        self.body = Some(body.into());
        self
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The request URL.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Sends [`Request`]s through an [`HttpService`], applying authentication and
/// classifying the outcome.
#[derive(Debug, Clone)]
pub struct Transport<S, A = NoAuthentication> {
    service: S,
    authentication: A,
}

impl<S> Transport<S> {
    /// An unauthenticated transport.
    pub fn new(service: S) -> Self {
        Self {
            service,
            authentication: NoAuthentication,
        }
    }
}

impl<S, A> Transport<S, A> {
    /// Replace the authentication applied to each request.
    pub fn with_authentication<B>(self, authentication: B) -> Transport<S, B> {
        Transport {
            service: self.service,
            authentication,
        }
    }

    /// The underlying HTTP service.
    pub fn service(&self) -> &S {
        &self.service
    }
}

impl<S, A> Transport<S, A>
where
    S: HttpService,
    A: Authentication,
{
    /// Send a request.
    ///
    /// A 2xx response is returned with its body unread. Any other status is
    /// turned into [`RegistryError::Status`], and a request which never got a
    /// response into [`RegistryError::Transport`].
    pub async fn send(&self, request: Request) -> Result<RegistryResponse, RegistryError> {
        let Request {
            method,
            url,
            headers,
            body,
        } = request;

        let mut req = reqwest::Request::new(method.clone(), url.clone());
        *req.headers_mut() = headers.into_header_map();
        *req.body_mut() = body;
        self.authentication.authenticate(&mut req);

        tracing::trace!(%method, %url, "sending registry request");
        let response = self
            .service
            .execute(req)
            .await
            .map_err(|source| RegistryError::Transport {
                method: method.clone(),
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::trace!(%method, %url, %status, "registry response");
            Ok(RegistryResponse::new(method, url, response))
        } else {
            tracing::debug!(%method, %url, %status, "registry error response");
            Err(HttpResponseError::from_response(method, url, response)
                .await
                .into())
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::StatusCode;

    use super::*;
    use crate::error::MAX_ERROR_BODY;
    use crate::mock::MockService;

    fn url(path: &str) -> Url {
        Url::parse("http://registry.test").unwrap().join(path).unwrap()
    }

    #[tokio::test]
    async fn success_returns_response() {
        let mock = MockService::new();
        mock.add(Method::GET, "/v2/", StatusCode::OK, Bytes::from_static(b"{}"));

        let transport = Transport::new(mock.clone());
        let response = transport.send(Request::get(url("/v2/"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.bytes().await.unwrap(), "{}");
    }

    #[tokio::test]
    async fn error_status_keeps_body() {
        let mock = MockService::new();
        mock.add(
            Method::GET,
            "/v2/demo/manifests/missing",
            StatusCode::NOT_FOUND,
            Bytes::from_static(b"  manifest unknown\n"),
        );

        let transport = Transport::new(mock);
        let err = transport
            .send(Request::get(url("/v2/demo/manifests/missing")))
            .await
            .unwrap_err();

        assert!(err.is_not_found());
        match err {
            RegistryError::Status(error) => {
                assert_eq!(error.method, Method::GET);
                assert_eq!(error.message, "manifest unknown");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn error_body_is_truncated() {
        let mock = MockService::new();
        mock.add(
            Method::PUT,
            "/v2/demo/blobs/uploads/1",
            StatusCode::BAD_REQUEST,
            Bytes::from(vec![b'x'; MAX_ERROR_BODY * 2]),
        );

        let transport = Transport::new(mock);
        let err = transport
            .send(Request::put(url("/v2/demo/blobs/uploads/1")))
            .await
            .unwrap_err();

        match err {
            RegistryError::Status(error) => assert_eq!(error.message.len(), MAX_ERROR_BODY),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_response_is_transport_error() {
        let transport = Transport::new(MockService::new());
        let err = transport
            .send(Request::delete(url("/v2/demo/manifests/x")))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Transport { .. }));
        assert!(err.status().is_none());
    }

    #[tokio::test]
    async fn headers_and_authentication_are_applied() {
        #[derive(Clone)]
        struct Token;

        impl Authentication for Token {
            fn authenticate(&self, request: &mut reqwest::Request) {
                request.headers_mut().insert(
                    http::header::AUTHORIZATION,
                    HeaderValue::from_static("Bearer t"),
                );
            }
        }

        let mock = MockService::new();
        mock.add(Method::GET, "/v2/", StatusCode::OK, Bytes::new());

        let transport = Transport::new(mock.clone()).with_authentication(Token);
        transport
            .send(
                Request::get(url("/v2/"))
                    .header(http::header::ACCEPT, HeaderValue::from_static("a"))
                    .header(http::header::ACCEPT, HeaderValue::from_static("b")),
            )
            .await
            .unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        let accept: Vec<_> = requests[0]
            .headers
            .get_all(http::header::ACCEPT)
            .iter()
            .collect();
        assert_eq!(accept, ["a", "b"]);
        assert_eq!(
            requests[0].headers.get(http::header::AUTHORIZATION).unwrap(),
            "Bearer t"
        );
    }
}
