//! # OCI registry storage
//!
//! A [`Store`] which keeps objects in a repository on an OCI registry. Each
//! object is uploaded as a blob, wrapped in a single-layer image manifest and
//! tagged with its category prefix and key.
//!
//! ```no_run
//! # async fn demo() -> Result<(), storage_driver::StorageError> {
//! use std::collections::HashMap;
//! use storage_driver::Store;
//!
//! let config = HashMap::from([("location".to_owned(), "oci://localhost:5000/demo".to_owned())]);
//! let store = oci_storage::new(&config)?;
//!
//! store.create(bytes::Bytes::from_static(b"config")).await?;
//! assert_eq!(store.open().await?, "config");
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::io::Cursor;

use bytes::Bytes;
use http::StatusCode;
use registry_client::{
    Authentication, DefaultService, Headers, HttpService, NoAuthentication, RegistryClient,
    RegistryError,
};
use storage_driver::{
    Download, Mac, Mode, Range, Resource, StorageError, StorageErrorKind, Store, Upload,
};

mod config;
mod tag;

pub use self::config::OciConfig;
pub use self::tag::{prefix, Tag, CONFIG_TAG};

/// Engine name reported by the store and its errors.
pub const OCI_STORAGE_NAME: &str = "oci";

/// URL scheme of store locations.
pub const OCI_STORAGE_SCHEME: &str = "oci";

/// Open a store from the host's configuration map.
pub fn new(config: &HashMap<String, String>) -> Result<OciStore, StorageError> {
    OciConfig::from_map(config)?.build()
}

/// Classify a registry failure.
fn error_kind(error: &RegistryError) -> StorageErrorKind {
    match error {
        RegistryError::Status(response) => match response.status {
            StatusCode::NOT_FOUND => StorageErrorKind::NotFound,
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => StorageErrorKind::PermissionDenied,
            StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT => StorageErrorKind::ServiceUnavailable,
            status if status.is_client_error() => StorageErrorKind::InvalidRequest,
            _ => StorageErrorKind::Other,
        },
        RegistryError::Transport { .. } | RegistryError::Body { .. } => StorageErrorKind::Io,
        RegistryError::MissingHeader { .. }
        | RegistryError::InvalidManifest(_)
        | RegistryError::InvalidDigest(_)
        | RegistryError::Url(_) => StorageErrorKind::Protocol,
        RegistryError::Json { .. } => StorageErrorKind::SerializationError,
        RegistryError::HeaderConflict(_) | RegistryError::InvalidHeader(_) => {
            StorageErrorKind::InvalidRequest
        }
        RegistryError::Client(_) => StorageErrorKind::InvalidConfig,
    }
}

/// A store backed by one repository on an OCI registry.
///
/// The store holds no mutable state. Clones share a connection pool.
#[derive(Clone)]
pub struct OciStore<S = DefaultService, A = NoAuthentication> {
    client: RegistryClient<S, A>,
    root: String,
    location: String,
}

impl<S, A> fmt::Debug for OciStore<S, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OciStore")
            .field("root", &self.root)
            .field("repository", &self.client.repository().name())
            .finish()
    }
}

impl<S, A> OciStore<S, A> {
    /// Wrap a registry client.
    ///
    /// The store location is `oci://host:port/<repository>`, with the port
    /// always spelled out. The scheme is not part of the location, so a store
    /// reached over `https` must be reopened with `scheme = https`.
    pub fn new(client: RegistryClient<S, A>) -> Self {
        let repository = client.repository();
        let origin = repository.origin();
        let root = origin.origin().ascii_serialization();

        let host = origin.host_str().unwrap_or_default();
        let location = match origin.port_or_known_default() {
            Some(port) => format!("{OCI_STORAGE_SCHEME}://{host}:{port}/{}", repository.name()),
            None => format!("{OCI_STORAGE_SCHEME}://{host}/{}", repository.name()),
        };

        Self {
            client,
            root,
            location,
        }
    }

    /// The registry client.
    pub fn client(&self) -> &RegistryClient<S, A> {
        &self.client
    }

    fn error(&self, error: RegistryError, tag: &Tag) -> StorageError {
        let builder = StorageError::builder(OCI_STORAGE_NAME, error_kind(&error), error);
        let builder = match tag {
            Tag::Config => builder.resource(Resource::Config).key(CONFIG_TAG),
            Tag::Resource { resource, mac } => builder.resource(*resource).key(mac.to_string()),
        };
        builder.build()
    }
}

fn unsupported(resource: Resource, mac: Option<Mac>) -> StorageError {
    let builder = StorageError::builder(
        OCI_STORAGE_NAME,
        StorageErrorKind::Unsupported,
        format!("resource category {resource} is not stored in oci registries"),
    )
    .resource(resource);

    let builder = match mac {
        Some(mac) => builder.key(mac.to_string()),
        None => builder,
    };
    builder.build()
}

fn resolve(resource: Resource, mac: Mac) -> Result<Tag, StorageError> {
    Tag::resource(resource, mac).ok_or_else(|| unsupported(resource, Some(mac)))
}

impl<S, A> OciStore<S, A>
where
    S: HttpService,
    A: Authentication,
{
    /// The keys of every object stored under a category.
    ///
    /// Tags which don't belong to the category, or which aren't a valid key,
    /// are skipped.
    #[tracing::instrument(skip(self), fields(repository = %self.client.repository().name()))]
    pub async fn list_by_prefix(&self, resource: Resource) -> Result<Vec<Mac>, StorageError> {
        let prefix = prefix(resource).ok_or_else(|| unsupported(resource, None))?;

        let list = self.client.tags().await.map_err(|error| {
            StorageError::builder(OCI_STORAGE_NAME, error_kind(&error), error)
                .resource(resource)
                .context("listing tags")
                .build()
        })?;

        let keys: Vec<Mac> = list
            .tags
            .iter()
            .filter_map(|tag| Tag::parse(tag, resource))
            .collect();

        tracing::trace!(prefix, tags = list.tags.len(), keys = keys.len(), "listed");
        Ok(keys)
    }
}

#[async_trait::async_trait]
impl<S, A> Store for OciStore<S, A>
where
    S: HttpService,
    A: Authentication,
{
    fn name(&self) -> &'static str {
        OCI_STORAGE_NAME
    }

    fn origin(&self) -> &str {
        self.client.repository().name()
    }

    fn root(&self) -> &str {
        &self.root
    }

    #[tracing::instrument(skip_all, fields(repository = %self.origin()))]
    async fn create(&self, config: Bytes) -> Result<(), StorageError> {
        let tag = Tag::Config;
        self.client
            .put_by_tag(&tag.to_string(), Cursor::new(config))
            .await
            .map_err(|error| self.error(error, &tag))?;
        Ok(())
    }

    #[tracing::instrument(skip_all, fields(repository = %self.origin()))]
    async fn open(&self) -> Result<Bytes, StorageError> {
        let tag = Tag::Config;
        let response = self
            .client
            .get_by_tag(&tag.to_string(), &Headers::new())
            .await
            .map_err(|error| self.error(error, &tag))?;

        response.bytes().await.map_err(|error| self.error(error, &tag))
    }

    async fn location(&self) -> Result<String, StorageError> {
        Ok(self.location.clone())
    }

    async fn mode(&self) -> Result<Mode, StorageError> {
        Ok(Mode::READ | Mode::WRITE)
    }

    async fn size(&self) -> Result<Option<u64>, StorageError> {
        Ok(None)
    }

    async fn list(&self, resource: Resource) -> Result<Vec<Mac>, StorageError> {
        self.list_by_prefix(resource).await
    }

    #[tracing::instrument(skip(self, reader), fields(repository = %self.origin()))]
    async fn put(
        &self,
        resource: Resource,
        mac: Mac,
        reader: Upload,
    ) -> Result<u64, StorageError> {
        let tag = resolve(resource, mac)?;
        self.client
            .put_by_tag(&tag.to_string(), reader)
            .await
            .map_err(|error| self.error(error, &tag))
    }

    #[tracing::instrument(skip(self), fields(repository = %self.origin()))]
    async fn get(
        &self,
        resource: Resource,
        mac: Mac,
        range: Option<Range>,
    ) -> Result<Download, StorageError> {
        let tag = resolve(resource, mac)?;

        let headers = match range {
            Some(range) => {
                let last = range.last().ok_or_else(|| {
                    StorageError::builder(
                        OCI_STORAGE_NAME,
                        StorageErrorKind::InvalidRequest,
                        format!("cannot request {} bytes at offset {}", range.length, range.offset),
                    )
                    .resource(resource)
                    .key(mac.to_string())
                    .build()
                })?;
                Headers::byte_range(range.offset, last)
            }
            None => Headers::new(),
        };

        let response = self
            .client
            .get_by_tag(&tag.to_string(), &headers)
            .await
            .map_err(|error| self.error(error, &tag))?;
        Ok(response.into_reader())
    }

    #[tracing::instrument(skip(self), fields(repository = %self.origin()))]
    async fn delete(&self, resource: Resource, mac: Mac) -> Result<(), StorageError> {
        let tag = resolve(resource, mac)?;
        self.client
            .delete_by_tag(&tag.to_string())
            .await
            .map_err(|error| self.error(error, &tag))
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.client.ping().await.map_err(|error| {
            StorageError::builder(OCI_STORAGE_NAME, error_kind(&error), error)
                .context("ping")
                .build()
        })
    }

    async fn close(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
