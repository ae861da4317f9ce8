//! Successful registry responses.

use std::io;
use std::pin::Pin;

use bytes::Bytes;
use futures::TryStreamExt as _;
use http::{HeaderMap, HeaderName, Method, StatusCode};
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use url::Url;

use crate::error::RegistryError;

/// A streaming blob body.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send + 'static>>;

/// A 2xx response from the registry, with its body not yet read.
#[derive(Debug)]
pub struct RegistryResponse {
    method: Method,
    url: Url,
    response: reqwest::Response,
}

impl RegistryResponse {
    pub(crate) fn new(method: Method, url: Url, response: reqwest::Response) -> Self {
        Self {
            method,
            url,
            response,
        }
    }

    /// The response status.
    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    /// The URL of the request that produced this response.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        self.response.headers()
    }

    /// A response header as a string, if present and valid.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
    }

    /// A response header which the protocol requires.
    pub fn require_header(&self, name: &HeaderName) -> Result<&str, RegistryError> {
        self.header(name).ok_or_else(|| RegistryError::MissingHeader {
            method: self.method.clone(),
            url: self.url.clone(),
            header: name.clone(),
        })
    }

    /// Read and discard the body so the connection can be reused.
    pub async fn drain(self) {
        let Self {
            method,
            url,
            mut response,
        } = self;

        loop {
            match response.chunk().await {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(error) => {
                    tracing::debug!(%method, %url, %error, "failed to drain response body");
                    break;
                }
            }
        }
    }

    /// Read the entire body.
    pub async fn bytes(self) -> Result<Bytes, RegistryError> {
        let Self {
            method,
            url,
            response,
        } = self;

        response
            .bytes()
            .await
            .map_err(|error| RegistryError::Body {
                method,
                url,
                source: error.into(),
            })
    }

    /// Read the entire body and decode it as JSON.
    pub async fn json<T>(self, context: &'static str) -> Result<T, RegistryError>
    where
        T: serde::de::DeserializeOwned,
    {
        let body = self.bytes().await?;
        serde_json::from_slice(&body).map_err(|source| RegistryError::Json { context, source })
    }

    /// Hand the body to the caller as a live reader.
    pub fn into_reader(self) -> BlobReader {
        let stream = self.response.bytes_stream().map_err(io::Error::other);
        Box::pin(StreamReader::new(stream))
    }
}
