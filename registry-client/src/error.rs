//! Error types for the registry client

use std::fmt;

use http::{HeaderName, Method, StatusCode};
use thiserror::Error;
use url::Url;

/// A boxed error, as produced by the underlying HTTP service.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The most response body retained on an error response.
pub const MAX_ERROR_BODY: usize = 64 << 10;

/// An error occured while talking to a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The request never produced a response (DNS, connection, TLS, cancellation).
    #[error("oci {method} {url}: {source}")]
    Transport {
        /// The request method.
        method: Method,
        /// The request URL.
        url: Url,
        /// The underlying transport error, verbatim.
        #[source]
        source: BoxError,
    },

    /// The registry answered with a non-success status.
    #[error(transparent)]
    Status(#[from] HttpResponseError),

    /// A header required by the protocol was absent from a response.
    #[error("oci {method} {url}: response is missing the {header} header")]
    MissingHeader {
        /// The request method.
        method: Method,
        /// The request URL.
        url: Url,
        /// The header which was expected.
        header: HeaderName,
    },

    /// A manifest could not be used to locate its payload.
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// A digest reported by the registry was not `<algorithm>:<hex>`.
    #[error("invalid digest: {0:?}")]
    InvalidDigest(String),

    /// A JSON document could not be encoded or decoded.
    #[error("{context}: {source}")]
    Json {
        /// What was being encoded or decoded.
        context: &'static str,
        /// The serde error.
        #[source]
        source: serde_json::Error,
    },

    /// A successful response body could not be read.
    #[error("oci {method} {url}: reading body: {source}")]
    Body {
        /// The request method.
        method: Method,
        /// The request URL.
        url: Url,
        /// The body error.
        #[source]
        source: BoxError,
    },

    /// A URL could not be built or resolved.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    /// A caller-supplied header collides with one the protocol sets.
    #[error("header {0} is set by the protocol and cannot be overridden")]
    HeaderConflict(HeaderName),

    /// A header value could not be represented.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    /// The HTTP client could not be constructed.
    #[error("building http client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RegistryError {
    /// The HTTP status of the registry response, if this is a status error.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            RegistryError::Status(error) => Some(error.status),
            _ => None,
        }
    }

    /// Returns true if the registry reported that the object does not exist.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(StatusCode::NOT_FOUND)
    }
}

/// A registry returned an error response.
#[derive(Debug, Clone)]
pub struct HttpResponseError {
    /// The request method.
    pub method: Method,

    /// The request URL.
    pub url: Url,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The start of the response body, at most [`MAX_ERROR_BODY`] bytes.
    pub message: String,
}

impl HttpResponseError {
    /// Build an error from a response, reading at most [`MAX_ERROR_BODY`]
    /// bytes of its body. The rest of the body is discarded.
    pub async fn from_response(method: Method, url: Url, mut response: reqwest::Response) -> Self {
        let status = response.status();
        let mut body = Vec::new();

        while body.len() < MAX_ERROR_BODY {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    let take = chunk.len().min(MAX_ERROR_BODY - body.len());
                    body.extend_from_slice(&chunk[..take]);
                }
                Ok(None) => break,
                Err(error) => {
                    tracing::debug!(%error, "failed to read error response body");
                    break;
                }
            }
        }

        let message = String::from_utf8_lossy(&body).trim().to_owned();

        Self {
            method,
            url,
            status,
            message,
        }
    }
}

impl fmt::Display for HttpResponseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "oci {} {}: {}: {}",
            self.method, self.url, self.status, self.message
        )
    }
}

impl std::error::Error for HttpResponseError {}
