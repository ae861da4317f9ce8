//! An in-process OCI registry for integration tests.
//!
//! The registry verifies upload digests, only finalizes sessions it knows
//! about, refuses manifests that reference missing blobs, and only deletes
//! manifests by digest. Faults can be switched on to mimic registries that
//! drop headers or move upload sessions around.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use oci_storage::OciStore;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

const DOCKER_CONTENT_DIGEST: HeaderName = HeaderName::from_static("docker-content-digest");
const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";

/// Install a test subscriber, honoring `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Misbehaviours the registry can be asked to exhibit.
#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    /// Start uploads without a `Location` header.
    pub omit_upload_location: bool,

    /// Answer manifest `HEAD` requests without `Docker-Content-Digest`.
    pub omit_content_digest: bool,

    /// Move the session after each `PATCH`, adding a `_state` query that
    /// must be sent back on finalize.
    pub rotate_upload_location: bool,

    /// Send absolute `Location` URLs instead of paths.
    pub absolute_locations: bool,
}

#[derive(Debug, Default)]
struct Repository {
    manifests: HashMap<String, Bytes>,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default)]
struct Inner {
    blobs: HashMap<String, Bytes>,
    uploads: HashMap<String, Vec<u8>>,
    repositories: HashMap<String, Repository>,
    requests: Vec<String>,
}

#[derive(Debug, Clone)]
struct Registry {
    inner: Arc<Mutex<Inner>>,
    faults: Faults,
    base: String,
}

/// A registry served on an ephemeral localhost port for the life of the value.
#[derive(Debug)]
pub struct TestRegistry {
    addr: SocketAddr,
    registry: Registry,
    server: tokio::task::JoinHandle<()>,
}

impl TestRegistry {
    pub async fn start() -> Self {
        Self::with_faults(Faults::default()).await
    }

    pub async fn with_faults(faults: Faults) -> Self {
        init_tracing();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let registry = Registry {
            inner: Default::default(),
            faults,
            base: format!("http://{addr}"),
        };

        let app = Router::new()
            .fallback(handle)
            .with_state(registry.clone())
            .layer(DefaultBodyLimit::disable());

        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestRegistry {
            addr,
            registry,
            server,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn location(&self, repository: &str) -> String {
        format!("oci://{}/{repository}", self.addr)
    }

    pub fn store(&self, repository: &str) -> OciStore {
        let config = HashMap::from([("location".to_owned(), self.location(repository))]);
        oci_storage::new(&config).unwrap()
    }

    /// Every request received, as `METHOD /path?query`.
    pub fn requests(&self) -> Vec<String> {
        self.registry.inner.lock().requests.clone()
    }

    pub fn tags(&self, repository: &str) -> Vec<String> {
        self.registry
            .inner
            .lock()
            .repositories
            .get(repository)
            .map(|repo| repo.tags.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn blob_count(&self) -> usize {
        self.registry.inner.lock().blobs.len()
    }

    /// Tag an unrelated manifest, as other registry users would.
    pub fn add_foreign_tag(&self, repository: &str, tag: &str) {
        let body = Bytes::from_static(b"{\"schemaVersion\":2}");
        let digest = sha256(&body);

        let mut inner = self.registry.inner.lock();
        let repo = inner.repositories.entry(repository.to_owned()).or_default();
        repo.manifests.insert(digest.clone(), body);
        repo.tags.insert(tag.to_owned(), digest);
    }
}

impl Drop for TestRegistry {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn sha256(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

fn error(status: StatusCode, code: &str, message: &str) -> Response {
    let body = serde_json::json!({ "errors": [{ "code": code, "message": message }] });
    (status, axum::Json(body)).into_response()
}

fn split<'a>(path: &'a str, marker: &str) -> Option<(&'a str, &'a str)> {
    path.rfind(marker)
        .map(|at| (&path[..at], &path[at + marker.len()..]))
}

fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

async fn handle(
    State(registry): State<Registry>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    registry
        .inner
        .lock()
        .requests
        .push(format!("{method} {uri}"));

    let path = uri.path();
    if path == "/v2/" || path == "/v2" {
        return (StatusCode::OK, axum::Json(serde_json::json!({}))).into_response();
    }

    let Some(rest) = path.strip_prefix("/v2/") else {
        return error(StatusCode::NOT_FOUND, "NAME_UNKNOWN", path);
    };

    if let Some((name, id)) = split(rest, "/blobs/uploads/") {
        return match (method, id) {
            (Method::POST, "") => registry.start_upload(name),
            (Method::PATCH, id) if !id.is_empty() => registry.patch_upload(name, id, &body),
            (Method::PUT, id) if !id.is_empty() => registry.finish_upload(name, id, &uri, &body),
            _ => error(StatusCode::METHOD_NOT_ALLOWED, "UNSUPPORTED", path),
        };
    }

    if let Some((_, digest)) = split(rest, "/blobs/") {
        return match method {
            Method::GET => registry.get_blob(digest, &headers),
            _ => error(StatusCode::METHOD_NOT_ALLOWED, "UNSUPPORTED", path),
        };
    }

    if let Some((name, reference)) = split(rest, "/manifests/") {
        return match method {
            Method::PUT => registry.put_manifest(name, reference, &headers, body),
            Method::GET => registry.get_manifest(name, reference, false),
            Method::HEAD => registry.get_manifest(name, reference, true),
            Method::DELETE => registry.delete_manifest(name, reference),
            _ => error(StatusCode::METHOD_NOT_ALLOWED, "UNSUPPORTED", path),
        };
    }

    if let Some(name) = rest.strip_suffix("/tags/list") {
        if method == Method::GET {
            return registry.list_tags(name);
        }
    }

    error(StatusCode::NOT_FOUND, "NAME_UNKNOWN", path)
}

impl Registry {
    fn location(&self, path: &str) -> HeaderValue {
        let location = if self.faults.absolute_locations {
            format!("{}{path}", self.base)
        } else {
            path.to_owned()
        };
        HeaderValue::from_str(&location).unwrap()
    }

    fn start_upload(&self, name: &str) -> Response {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.inner.lock().uploads.insert(id.clone(), Vec::new());

        let mut headers = HeaderMap::new();
        if !self.faults.omit_upload_location {
            headers.insert(
                header::LOCATION,
                self.location(&format!("/v2/{name}/blobs/uploads/{id}")),
            );
        }
        headers.insert(header::RANGE, HeaderValue::from_static("0-0"));
        (StatusCode::ACCEPTED, headers).into_response()
    }

    fn patch_upload(&self, name: &str, id: &str, body: &[u8]) -> Response {
        let mut inner = self.inner.lock();
        let Some(mut data) = inner.uploads.remove(id) else {
            return error(StatusCode::NOT_FOUND, "BLOB_UPLOAD_UNKNOWN", id);
        };
        data.extend_from_slice(body);

        let end = data.len().saturating_sub(1);
        let (next, path) = if self.faults.rotate_upload_location {
            let next = uuid::Uuid::new_v4().simple().to_string();
            let state = uuid::Uuid::new_v4().simple().to_string();
            let path = format!("/v2/{name}/blobs/uploads/{next}?_state={state}");
            (next, path)
        } else {
            (id.to_owned(), format!("/v2/{name}/blobs/uploads/{id}"))
        };
        inner.uploads.insert(next, data);

        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, self.location(&path));
        headers.insert(
            header::RANGE,
            HeaderValue::from_str(&format!("0-{end}")).unwrap(),
        );
        (StatusCode::ACCEPTED, headers).into_response()
    }

    fn finish_upload(&self, name: &str, id: &str, uri: &Uri, body: &[u8]) -> Response {
        let Some(digest) = query_param(uri, "digest") else {
            return error(StatusCode::BAD_REQUEST, "DIGEST_INVALID", "missing digest");
        };

        if self.faults.rotate_upload_location && query_param(uri, "_state").is_none() {
            return error(StatusCode::BAD_REQUEST, "BLOB_UPLOAD_INVALID", "missing _state");
        }

        let mut inner = self.inner.lock();
        let Some(mut data) = inner.uploads.remove(id) else {
            return error(StatusCode::NOT_FOUND, "BLOB_UPLOAD_UNKNOWN", id);
        };
        data.extend_from_slice(body);

        let actual = sha256(&data);
        if actual != digest {
            return error(StatusCode::BAD_REQUEST, "DIGEST_INVALID", &actual);
        }
        inner.blobs.insert(digest.clone(), Bytes::from(data));

        let mut headers = HeaderMap::new();
        headers.insert(
            header::LOCATION,
            self.location(&format!("/v2/{name}/blobs/{digest}")),
        );
        headers.insert(DOCKER_CONTENT_DIGEST, HeaderValue::from_str(&digest).unwrap());
        (StatusCode::CREATED, headers).into_response()
    }

    fn get_blob(&self, digest: &str, headers: &HeaderMap) -> Response {
        let Some(blob) = self.inner.lock().blobs.get(digest).cloned() else {
            return error(StatusCode::NOT_FOUND, "BLOB_UNKNOWN", digest);
        };

        let Some(range) = headers.get(header::RANGE) else {
            return (StatusCode::OK, blob).into_response();
        };

        let range = range.to_str().unwrap_or_default();
        let parsed = range
            .strip_prefix("bytes=")
            .and_then(|range| range.split_once('-'))
            .and_then(|(first, last)| Some((first.parse::<usize>().ok()?, last.parse::<usize>().ok()?)));

        match parsed {
            Some((first, last)) if first <= last && first < blob.len() => {
                let last = last.min(blob.len() - 1);
                let content_range = format!("bytes {first}-{last}/{}", blob.len());
                (
                    StatusCode::PARTIAL_CONTENT,
                    [(header::CONTENT_RANGE, content_range)],
                    blob.slice(first..=last),
                )
                    .into_response()
            }
            _ => error(StatusCode::RANGE_NOT_SATISFIABLE, "BLOB_UNKNOWN", range),
        }
    }

    fn put_manifest(&self, name: &str, reference: &str, headers: &HeaderMap, body: Bytes) -> Response {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        if content_type != OCI_MANIFEST {
            return error(StatusCode::BAD_REQUEST, "MANIFEST_INVALID", content_type);
        }

        let Ok(manifest) = serde_json::from_slice::<serde_json::Value>(&body) else {
            return error(StatusCode::BAD_REQUEST, "MANIFEST_INVALID", "not json");
        };

        let mut inner = self.inner.lock();
        let referenced = std::iter::once(&manifest["config"])
            .chain(manifest["layers"].as_array().into_iter().flatten());
        for descriptor in referenced {
            let digest = descriptor["digest"].as_str().unwrap_or_default();
            if !inner.blobs.contains_key(digest) {
                return error(StatusCode::BAD_REQUEST, "MANIFEST_BLOB_UNKNOWN", digest);
            }
        }

        let digest = sha256(&body);
        let repo = inner.repositories.entry(name.to_owned()).or_default();
        repo.manifests.insert(digest.clone(), body);
        if !reference.starts_with("sha256:") {
            repo.tags.insert(reference.to_owned(), digest.clone());
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::LOCATION,
            self.location(&format!("/v2/{name}/manifests/{digest}")),
        );
        headers.insert(DOCKER_CONTENT_DIGEST, HeaderValue::from_str(&digest).unwrap());
        (StatusCode::CREATED, headers).into_response()
    }

    fn get_manifest(&self, name: &str, reference: &str, head: bool) -> Response {
        let inner = self.inner.lock();
        let found = inner.repositories.get(name).and_then(|repo| {
            let digest = repo
                .tags
                .get(reference)
                .cloned()
                .unwrap_or_else(|| reference.to_owned());
            repo.manifests.get(&digest).map(|body| (digest, body.clone()))
        });

        let Some((digest, body)) = found else {
            return error(StatusCode::NOT_FOUND, "MANIFEST_UNKNOWN", reference);
        };

        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(OCI_MANIFEST));
        if !(head && self.faults.omit_content_digest) {
            headers.insert(DOCKER_CONTENT_DIGEST, HeaderValue::from_str(&digest).unwrap());
        }

        if head {
            (StatusCode::OK, headers).into_response()
        } else {
            (StatusCode::OK, headers, body).into_response()
        }
    }

    fn delete_manifest(&self, name: &str, reference: &str) -> Response {
        if !reference.starts_with("sha256:") {
            return error(
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED",
                "manifests can only be deleted by digest",
            );
        }

        let mut inner = self.inner.lock();
        let Some(repo) = inner.repositories.get_mut(name) else {
            return error(StatusCode::NOT_FOUND, "MANIFEST_UNKNOWN", reference);
        };
        if repo.manifests.remove(reference).is_none() {
            return error(StatusCode::NOT_FOUND, "MANIFEST_UNKNOWN", reference);
        }
        repo.tags.retain(|_, digest| digest != reference);

        StatusCode::ACCEPTED.into_response()
    }

    fn list_tags(&self, name: &str) -> Response {
        let inner = self.inner.lock();
        let tags: Vec<String> = inner
            .repositories
            .get(name)
            .map(|repo| repo.tags.keys().cloned().collect())
            .unwrap_or_default();

        axum::Json(serde_json::json!({ "name": name, "tags": tags })).into_response()
    }
}
