//! # Registry client
//!
//! A client for the subset of the OCI Distribution protocol needed to store
//! opaque blobs under tags: chunk-free blob uploads, single-layer manifests,
//! manifest deletion by digest, and tag listing.
//!
//! ```no_run
//! # async fn demo() -> Result<(), registry_client::RegistryError> {
//! use registry_client::{Headers, RegistryClient};
//!
//! let client = RegistryClient::builder("http://localhost:5000".parse()?, "demo").build()?;
//! client.ping().await?;
//!
//! let size = client.put_by_tag("greeting", std::io::Cursor::new(b"hello".to_vec())).await?;
//! assert_eq!(size, 5);
//!
//! let blob = client.get_by_tag("greeting", &Headers::new()).await?;
//! assert_eq!(blob.bytes().await?, "hello");
//! # Ok(())
//! # }
//! ```

use url::Url;

mod authentication;
mod digest;
mod error;
mod headers;
pub mod manifest;
pub mod mock;
mod response;
mod tags;
pub mod transport;
pub mod upload;
pub mod uri;

pub use self::authentication::{Authentication, NoAuthentication};
pub use self::digest::Digest;
pub use self::error::{BoxError, HttpResponseError, RegistryError, MAX_ERROR_BODY};
pub use self::headers::Headers;
pub use self::manifest::{Descriptor, Manifest};
pub use self::response::{BlobReader, RegistryResponse};
pub use self::tags::TagList;
pub use self::transport::{HttpService, Request, Transport};
pub use self::uri::Repository;

/// The HTTP service used by clients from [`RegistryClient::builder`].
pub type DefaultService = reqwest::Client;

/// A client for one repository on an OCI registry.
///
/// The client is immutable once built. Cloning it is cheap and clones share
/// the underlying connection pool.
#[derive(Debug, Clone)]
pub struct RegistryClient<S = DefaultService, A = NoAuthentication> {
    repository: Repository,
    transport: Transport<S, A>,
}

impl RegistryClient {
    /// Start building a client backed by [`reqwest::Client`].
    pub fn builder(origin: Url, repository: &str) -> ClientBuilder {
        ClientBuilder {
            origin,
            repository: repository.to_owned(),
            tls_insecure_skip_verify: false,
        }
    }
}

impl<S> RegistryClient<S> {
    /// Create a client which sends requests through a custom HTTP service.
    pub fn with_service(repository: Repository, service: S) -> Self {
        Self {
            repository,
            transport: Transport::new(service),
        }
    }
}

impl<S, A> RegistryClient<S, A> {
    /// Replace the authentication applied to every request.
    pub fn with_authentication<B>(self, authentication: B) -> RegistryClient<S, B> {
        RegistryClient {
            repository: self.repository,
            transport: self.transport.with_authentication(authentication),
        }
    }

    /// The repository this client talks to.
    pub fn repository(&self) -> &Repository {
        &self.repository
    }

    /// The transport used to send requests.
    pub fn transport(&self) -> &Transport<S, A> {
        &self.transport
    }
}

impl<S, A> RegistryClient<S, A>
where
    S: HttpService,
    A: Authentication,
{
    /// Send a single request through the transport.
    pub async fn send(&self, request: Request) -> Result<RegistryResponse, RegistryError> {
        self.transport.send(request).await
    }

    /// Check that the registry API is reachable with a `GET /v2/`.
    #[tracing::instrument(skip(self), fields(origin = %self.repository.origin()))]
    pub async fn ping(&self) -> Result<(), RegistryError> {
        let url = self.repository.api_root()?;
        self.send(Request::get(url)).await?.drain().await;
        Ok(())
    }
}

/// Configures the [`reqwest::Client`] behind a [`RegistryClient`].
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    origin: Url,
    repository: String,
    tls_insecure_skip_verify: bool,
}

impl ClientBuilder {
    /// Disable TLS certificate verification.
    pub fn tls_insecure_skip_verify(mut self, skip: bool) -> Self {
        self.tls_insecure_skip_verify = skip;
        self
    }

    /// Build the client. No request timeout is configured.
    pub fn build(self) -> Result<RegistryClient, RegistryError> {
        let builder = reqwest::Client::builder();

        #[cfg(any(feature = "rustls-tls", feature = "native-tls"))]
        let builder = builder.danger_accept_invalid_certs(self.tls_insecure_skip_verify);

        #[cfg(not(any(feature = "rustls-tls", feature = "native-tls")))]
        if self.tls_insecure_skip_verify {
            tracing::warn!("TLS support is not compiled in, ignoring tls_insecure_skip_verify");
        }

        let client = builder.build().map_err(RegistryError::Client)?;
        Ok(RegistryClient::with_service(
            Repository::new(self.origin, &self.repository),
            client,
        ))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use http::{Method, StatusCode};

    use super::*;
    use crate::mock::MockService;

    fn client(mock: &MockService) -> RegistryClient<MockService> {
        let repository = Repository::new("http://registry.test".parse().unwrap(), "demo");
        RegistryClient::with_service(repository, mock.clone())
    }

    #[tokio::test]
    async fn ping_hits_api_root() {
        let mock = MockService::new();
        mock.add(Method::GET, "/v2/", StatusCode::OK, Bytes::from_static(b"{}"));

        client(&mock).ping().await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url.as_str(), "http://registry.test/v2/");
    }

    #[tokio::test]
    async fn ping_reports_status() {
        let mock = MockService::new();
        mock.add(Method::GET, "/v2/", StatusCode::UNAUTHORIZED, Bytes::new());

        let err = client(&mock).ping().await.unwrap_err();
        assert_eq!(err.status(), Some(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn builder_builds() {
        let client = RegistryClient::builder("https://registry.test/".parse().unwrap(), "a/b")
            .tls_insecure_skip_verify(true)
            .build()
            .unwrap();
        assert_eq!(client.repository().name(), "a/b");
    }
}
