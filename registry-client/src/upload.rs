//! The three-phase blob upload: open a session, stream the payload while
//! hashing it, then finalize at the latest session location with the digest.

use http::header::{self, HeaderValue};
use tokio::io::AsyncRead;
use url::Url;

use crate::authentication::Authentication;
use crate::digest::{Digest, DigestWriter};
use crate::error::RegistryError;
use crate::transport::{HttpService, Request};
use crate::uri::with_digest;
use crate::RegistryClient;

const OCTET_STREAM: &str = "application/octet-stream";

/// An in-progress blob upload.
///
/// The session lives only for the duration of one upload and is threaded
/// through each phase.
#[derive(Debug)]
pub struct UploadSession {
    location: Url,
    digest: DigestWriter,
}

impl UploadSession {
    fn new(location: Url) -> Self {
        Self {
            location,
            digest: DigestWriter::new(),
        }
    }

    /// The current session URL.
    pub fn location(&self) -> &Url {
        &self.location
    }
}

impl<S, A> RegistryClient<S, A>
where
    S: HttpService,
    A: Authentication,
{
    /// Upload a blob, returning its digest and size.
    ///
    /// The digest is computed locally from the bytes streamed. If the registry
    /// reports the uploaded range, its size is used. Otherwise the size is
    /// the number of bytes read from `body`. An empty upload is always size 0.
    #[tracing::instrument(skip_all, fields(repository = %self.repository().name()))]
    pub async fn upload_blob<R>(&self, body: R) -> Result<(Digest, u64), RegistryError>
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        let mut session = self.start_upload().await?;
        let reported = self.stream_upload(&mut session, body).await?;

        let (digest, counted) = session.digest.finish();
        let size = match reported {
            Some(reported) if reported == counted => counted,
            // Registries report `0-0` for an empty session.
            Some(1) if counted == 0 => 0,
            Some(reported) => {
                tracing::warn!(
                    reported,
                    counted,
                    "registry reported a different upload size"
                );
                reported
            }
            None => counted,
        };

        self.finish_upload(session, &digest).await?;
        tracing::debug!(%digest, size, "uploaded blob");
        Ok((digest, size))
    }

    /// Open an upload session.
    pub async fn start_upload(&self) -> Result<UploadSession, RegistryError> {
        let url = self.repository().uploads()?;
        let response = self.send(Request::post(url).body(Vec::new())).await?;

        let location = response.require_header(&header::LOCATION)?;
        let location = self.repository().resolve(location)?;
        response.drain().await;

        tracing::trace!(%location, "opened upload session");
        Ok(UploadSession::new(location))
    }

    /// Stream the payload into the session, following a rotated session
    /// location. Returns the size reported by the registry, if any.
    pub async fn stream_upload<R>(
        &self,
        session: &mut UploadSession,
        body: R,
    ) -> Result<Option<u64>, RegistryError>
    where
        R: AsyncRead + Send + Sync + 'static,
    {
        let request = Request::patch(session.location.clone())
            .header(header::CONTENT_TYPE, HeaderValue::from_static(OCTET_STREAM))
            .body(session.digest.body(body));
        let response = self.send(request).await?;

        if let Some(location) = response.header(&header::LOCATION) {
            session.location = self.repository().resolve(location)?;
            tracing::trace!(location = %session.location, "upload session moved");
        }

        let reported = response.header(&header::RANGE).and_then(parse_uploaded_size);
        response.drain().await;
        Ok(reported)
    }

    /// Finalize the session with the digest of the streamed content.
    pub async fn finish_upload(
        &self,
        session: UploadSession,
        digest: &Digest,
    ) -> Result<(), RegistryError> {
        let url = with_digest(session.location, digest);
        self.send(Request::put(url).body(Vec::new()))
            .await?
            .drain()
            .await;
        Ok(())
    }
}

/// Parse an upload `Range` header of the form `<start>-<end>` into a size.
fn parse_uploaded_size(range: &str) -> Option<u64> {
    let range = range.trim();
    let range = range.strip_prefix("bytes=").unwrap_or(range);
    let (start, end) = range.split_once('-')?;
    start.trim().parse::<u64>().ok()?;
    end.trim().parse::<u64>().ok()?.checked_add(1)
}
