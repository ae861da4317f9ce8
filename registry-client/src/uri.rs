//! URL construction for the `/v2/<repository>/...` namespace.

use url::Url;

use crate::digest::Digest;
use crate::error::RegistryError;

/// A repository on a registry: the registry origin plus the repository path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    origin: Url,
    name: String,
}

impl Repository {
    /// Create a repository handle.
    ///
    /// Only the scheme, host and port of `origin` are kept. Leading and
    /// trailing slashes are trimmed from `name`.
    pub fn new(mut origin: Url, name: &str) -> Self {
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);

        Self {
            origin,
            name: name.trim_matches('/').to_owned(),
        }
    }

    /// The registry origin, with an empty (`/`) path.
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// The repository path, e.g. `library/demo`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The API root, `<origin>/v2/`.
    pub fn api_root(&self) -> Result<Url, RegistryError> {
        Ok(self.origin.join("/v2/")?)
    }

    /// An endpoint below the repository, `<origin>/v2/<repository><path>`.
    pub fn endpoint(&self, path: &str) -> Result<Url, RegistryError> {
        Ok(self.origin.join(&format!("/v2/{}{}", self.name, path))?)
    }

    /// The blob upload initiation endpoint.
    pub fn uploads(&self) -> Result<Url, RegistryError> {
        self.endpoint("/blobs/uploads/")
    }

    /// A blob, by digest.
    pub fn blob(&self, digest: &str) -> Result<Url, RegistryError> {
        self.endpoint(&format!("/blobs/{digest}"))
    }

    /// A manifest, by tag or digest.
    pub fn manifest(&self, reference: &str) -> Result<Url, RegistryError> {
        self.endpoint(&format!("/manifests/{reference}"))
    }

    /// The tag listing endpoint.
    pub fn tags(&self) -> Result<Url, RegistryError> {
        self.endpoint("/tags/list")
    }

    /// Resolve a `Location` header value, which may be absolute or
    /// relative, against the registry origin.
    pub fn resolve(&self, location: &str) -> Result<Url, RegistryError> {
        Ok(self.origin.join(location)?)
    }
}

/// Append the `digest` query parameter used to finalize an upload.
///
/// Existing query parameters (such as upload state tokens) are kept.
pub fn with_digest(mut url: Url, digest: &Digest) -> Url {
    url.query_pairs_mut().append_pair("digest", digest.as_str());
    url
}
