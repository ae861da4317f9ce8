//! Content digests, and hashing a blob while it streams to the registry.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use futures::TryStreamExt as _;
use parking_lot::Mutex;
use sha2::{Digest as _, Sha256};
use tokio::io::AsyncRead;
use tokio_util::io::ReaderStream;

use crate::error::RegistryError;

/// A content digest, in the `<algorithm>:<hex>` form used by the registry.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Digest(String);

impl Digest {
    /// The SHA-256 digest of a byte slice.
    pub fn sha256(data: &[u8]) -> Self {
        Self::from_hasher(Sha256::new_with_prefix(data))
    }

    fn from_hasher(hasher: Sha256) -> Self {
        Digest(format!("sha256:{}", hex::encode(hasher.finalize())))
    }

    /// The digest as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The algorithm part of the digest, e.g. `sha256`.
    pub fn algorithm(&self) -> &str {
        self.0.split_once(':').map(|(alg, _)| alg).unwrap_or_default()
    }
}

impl FromStr for Digest {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((alg, hex))
                if !alg.is_empty()
                    && !hex.is_empty()
                    && hex.bytes().all(|b| b.is_ascii_hexdigit()) =>
            {
                Ok(Digest(s.to_owned()))
            }
            _ => Err(RegistryError::InvalidDigest(s.to_owned())),
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Digest").field(&self.0).finish()
    }
}

#[derive(Default)]
struct DigestState {
    hasher: Sha256,
    size: u64,
}

/// Hashes and counts bytes as they are pulled into a request body.
#[derive(Clone, Default)]
pub(crate) struct DigestWriter {
    state: Arc<Mutex<DigestState>>,
}

impl fmt::Debug for DigestWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigestWriter")
            .field("size", &self.state.lock().size)
            .finish()
    }
}

impl DigestWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wrap a reader as a streaming request body which feeds this writer.
    pub(crate) fn body<R>(&self, reader: R) -> reqwest::Body
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        let state = self.state.clone();
        let stream = ReaderStream::new(reader).inspect_ok(move |chunk| {
            let mut state = state.lock();
            state.hasher.update(chunk);
            state.size += chunk.len() as u64;
        });
        reqwest::Body::wrap_stream(stream)
    }

    /// The digest and byte count of everything streamed so far.
    pub(crate) fn finish(&self) -> (Digest, u64) {
        let state = self.state.lock();
        (Digest::from_hasher(state.hasher.clone()), state.size)
    }
}
