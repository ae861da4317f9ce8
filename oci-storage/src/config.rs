use std::collections::HashMap;

use eyre::eyre;
use registry_client::RegistryClient;
use serde::Deserialize;
use storage_driver::{StorageError, StorageErrorKind};
use url::Url;

use crate::{OciStore, OCI_STORAGE_NAME, OCI_STORAGE_SCHEME};

fn default_scheme() -> String {
    "http".to_owned()
}

fn default_insecure() -> bool {
    true
}

/// Configuration for an OCI registry store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OciConfig {
    /// `oci://host[:port]/<repository>`
    pub location: String,

    /// The scheme used to reach the registry, `http` or `https`.
    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Skip verification of the registry's TLS certificate.
    #[serde(default = "default_insecure")]
    pub tls_insecure_skip_verify: bool,
}

impl OciConfig {
    /// A configuration with the default scheme and TLS policy.
    pub fn new<S: Into<String>>(location: S) -> Self {
        Self {
            location: location.into(),
            scheme: default_scheme(),
            tls_insecure_skip_verify: default_insecure(),
        }
    }

    /// Read the configuration from the host's string map.
    pub fn from_map(config: &HashMap<String, String>) -> Result<Self, StorageError> {
        let location = config
            .get("location")
            .ok_or_else(|| invalid(eyre!("missing required key: location")))?;

        let mut parsed = OciConfig::new(location.as_str());

        if let Some(scheme) = config.get("scheme") {
            parsed.scheme = scheme.clone();
        }

        if let Some(skip) = config.get("tls_insecure_skip_verify") {
            parsed.tls_insecure_skip_verify = parse_bool(skip).ok_or_else(|| {
                invalid(eyre!("tls_insecure_skip_verify must be true or false, got {skip:?}"))
            })?;
        }

        Ok(parsed)
    }

    /// Split the location into the registry origin and the repository path.
    pub fn endpoint(&self) -> Result<(Url, String), StorageError> {
        let scheme = self.scheme.to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(invalid(eyre!("unsupported scheme {scheme:?}")));
        }

        let prefix = format!("{OCI_STORAGE_SCHEME}://");
        let rest = self.location.strip_prefix(&prefix).unwrap_or(&self.location);

        let mut url = Url::parse(&format!("{scheme}://{rest}")).map_err(|err| {
            invalid(eyre!(err).wrap_err(format!("invalid location {:?}", self.location)))
        })?;

        let repository = url.path().trim_matches('/').to_owned();
        if repository.is_empty() {
            return Err(invalid(eyre!(
                "location {:?} has no repository path",
                self.location
            )));
        }

        url.set_path("/");
        url.set_query(None);
        url.set_fragment(None);
        Ok((url, repository))
    }

    /// Build the store. No requests are made.
    #[tracing::instrument(skip(self), fields(location = %self.location))]
    pub fn build(&self) -> Result<OciStore, StorageError> {
        let (origin, repository) = self.endpoint()?;

        let client = RegistryClient::builder(origin, &repository)
            .tls_insecure_skip_verify(self.tls_insecure_skip_verify)
            .build()
            .map_err(StorageError::with(OCI_STORAGE_NAME, StorageErrorKind::InvalidConfig))?;

        tracing::debug!(
            origin = %client.repository().origin(),
            repository = %client.repository().name(),
            "configured oci store"
        );
        Ok(OciStore::new(client))
    }
}

fn invalid(report: eyre::Report) -> StorageError {
    StorageError::new(OCI_STORAGE_NAME, StorageErrorKind::InvalidConfig, report)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
