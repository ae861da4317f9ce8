//! Binding blobs to tags with single-layer OCI image manifests.

use std::io::Cursor;

use http::header::{self, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::authentication::Authentication;
use crate::digest::Digest;
use crate::error::RegistryError;
use crate::headers::Headers;
use crate::response::RegistryResponse;
use crate::transport::{HttpService, Request};
use crate::RegistryClient;

/// Media type of an OCI image manifest.
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// Media type of a Docker v2 schema 2 manifest, accepted on reads.
pub const DOCKER_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

/// Media type of the image config blob.
pub const OCI_CONFIG: &str = "application/vnd.oci.image.config.v1+json";

/// Media type of a payload layer.
pub const LAYER: &str = "application/octet-stream";

/// The config blob written with every manifest.
pub const EMPTY_CONFIG: &[u8] = b"{}";

const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");

fn accept() -> (HeaderName, HeaderValue) {
    (
        header::ACCEPT,
        HeaderValue::from_static(
            "application/vnd.oci.image.manifest.v1+json, application/vnd.docker.distribution.manifest.v2+json",
        ),
    )
}

/// A reference to a blob: its media type, digest and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// The media type of the referenced blob.
    #[serde(default)]
    pub media_type: String,

    /// The content digest of the blob.
    #[serde(default)]
    pub digest: String,

    /// The size of the blob in bytes.
    #[serde(default)]
    pub size: u64,
}

impl Descriptor {
    /// Describe a blob.
    pub fn new(media_type: &str, digest: &Digest, size: u64) -> Self {
        Self {
            media_type: media_type.to_owned(),
            digest: digest.to_string(),
            size,
        }
    }
}

/// An image manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Always 2.
    pub schema_version: u32,

    /// The manifest media type.
    #[serde(default)]
    pub media_type: String,

    /// The config blob.
    pub config: Descriptor,

    /// The layers. Only the first is used.
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl Manifest {
    /// A manifest with the empty config and a single payload layer.
    pub fn single_layer(config: Descriptor, payload: Descriptor) -> Self {
        Self {
            schema_version: 2,
            media_type: OCI_MANIFEST.to_owned(),
            config,
            layers: vec![payload],
        }
    }

    /// The payload descriptor: the first layer.
    pub fn payload(&self) -> Result<&Descriptor, RegistryError> {
        let layer = self
            .layers
            .first()
            .ok_or_else(|| RegistryError::InvalidManifest("manifest has no layers".into()))?;

        if layer.digest.is_empty() {
            return Err(RegistryError::InvalidManifest(
                "first layer has no digest".into(),
            ));
        }

        layer.digest.parse::<Digest>().map_err(|_| {
            RegistryError::InvalidManifest(format!(
                "first layer has an invalid digest {:?}",
                layer.digest
            ))
        })?;

        Ok(layer)
    }
}

impl<S, A> RegistryClient<S, A>
where
    S: HttpService,
    A: Authentication,
{
    /// Upload `body` and bind it to `tag`, returning the payload size.
    ///
    /// The tag only becomes visible once the manifest is written, which is
    /// the last step.
    #[tracing::instrument(skip(self, body), fields(repository = %self.repository().name()))]
    pub async fn put_by_tag<R>(&self, tag: &str, body: R) -> Result<u64, RegistryError>
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        let (payload, size) = self.upload_blob(body).await?;
        let (config, config_size) = self.upload_blob(Cursor::new(EMPTY_CONFIG)).await?;

        let manifest = Manifest::single_layer(
            Descriptor::new(OCI_CONFIG, &config, config_size),
            Descriptor::new(LAYER, &payload, size),
        );
        let body = serde_json::to_vec(&manifest).map_err(|source| RegistryError::Json {
            context: "encoding manifest",
            source,
        })?;

        let url = self.repository().manifest(tag)?;
        self.send(
            Request::put(url)
                .header(header::CONTENT_TYPE, HeaderValue::from_static(OCI_MANIFEST))
                .body(body),
        )
        .await?
        .drain()
        .await;

        tracing::debug!(%payload, size, "bound blob to tag");
        Ok(size)
    }

    /// Fetch the manifest for a tag.
    pub async fn get_manifest(&self, tag: &str) -> Result<Manifest, RegistryError> {
        let url = self.repository().manifest(tag)?;
        let (name, value) = accept();
        let body = self.send(Request::get(url).header(name, value)).await?.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| RegistryError::InvalidManifest(err.to_string()))
    }

    /// Fetch the blob bound to `tag`.
    ///
    /// `headers` are sent with the blob request, e.g. to request a byte
    /// range. The caller must read or drop the returned body.
    #[tracing::instrument(skip(self, headers), fields(repository = %self.repository().name()))]
    pub async fn get_by_tag(
        &self,
        tag: &str,
        headers: &Headers,
    ) -> Result<RegistryResponse, RegistryError> {
        let manifest = self.get_manifest(tag).await?;
        let payload = manifest.payload()?;

        let headers = Headers::merge(Headers::new(), headers)?;
        let url = self.repository().blob(&payload.digest)?;
        self.send(Request::get(url).headers(headers)).await
    }

    /// Resolve a tag to the digest of its manifest.
    pub async fn head_manifest_digest(&self, tag: &str) -> Result<Digest, RegistryError> {
        let url = self.repository().manifest(tag)?;
        let (name, value) = accept();
        let response = self.send(Request::head(url).header(name, value)).await?;

        let digest = response.require_header(&DOCKER_CONTENT_DIGEST)?.parse()?;
        response.drain().await;
        Ok(digest)
    }

    /// Remove the binding for `tag` by deleting its manifest.
    #[tracing::instrument(skip(self), fields(repository = %self.repository().name()))]
    pub async fn delete_by_tag(&self, tag: &str) -> Result<(), RegistryError> {
        let digest = self.head_manifest_digest(tag).await?;

        let url = self.repository().manifest(digest.as_str())?;
        self.send(Request::delete(url)).await?.drain().await;

        tracing::debug!(%digest, "deleted manifest");
        Ok(())
    }
}
