use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use tracing_error::SpanTrace;

use crate::Resource;

/// Categorizes storage errors by their semantic meaning, independent of
/// the backend that produced them.
///
/// Callers match on the kind to decide how to respond, without inspecting
/// error messages or knowing backend-specific details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The requested object does not exist.
    ///
    /// **Caller action:** Handle as a missing object.
    NotFound,

    /// The backend refused the operation.
    ///
    /// **Caller action:** Check credentials or repository permissions.
    PermissionDenied,

    /// The operation failed in transit (DNS, connection, TLS, cancellation).
    ///
    /// **Caller action:** Consider retrying; the backend does not.
    Io,

    /// The backing service is temporarily unavailable.
    ///
    /// **Caller action:** Retry later.
    ServiceUnavailable,

    /// The store configuration is malformed or incomplete.
    ///
    /// **Caller action:** Fix the configuration; nothing was contacted.
    InvalidConfig,

    /// The request was invalid (bad parameters, conflicting headers).
    ///
    /// **Caller action:** Fix the request parameters.
    InvalidRequest,

    /// The backend does not support this operation or resource category.
    ///
    /// **Caller action:** Use a different backend for this resource.
    Unsupported,

    /// The remote side violated the protocol contract (missing headers,
    /// malformed documents).
    ///
    /// **Caller action:** Check backend compatibility.
    Protocol,

    /// Data serialization or deserialization failed.
    SerializationError,

    /// An unexpected or uncategorized error occurred.
    Other,
}

impl StorageErrorKind {
    /// Returns whether this error kind typically indicates a transient condition.
    ///
    /// This is advisory only: no backend in this workspace retries on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StorageErrorKind::ServiceUnavailable | StorageErrorKind::Io
        )
    }

    /// Returns whether this error indicates a client-side fault.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            StorageErrorKind::InvalidRequest
                | StorageErrorKind::InvalidConfig
                | StorageErrorKind::Unsupported
                | StorageErrorKind::PermissionDenied
        )
    }

    /// Returns whether this error indicates a fault on the remote side.
    pub fn is_server_fault(&self) -> bool {
        matches!(
            self,
            StorageErrorKind::ServiceUnavailable | StorageErrorKind::Protocol
        )
    }
}

impl fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageErrorKind::NotFound => write!(f, "not found"),
            StorageErrorKind::PermissionDenied => write!(f, "permission denied"),
            StorageErrorKind::Io => write!(f, "I/O error"),
            StorageErrorKind::ServiceUnavailable => write!(f, "service unavailable"),
            StorageErrorKind::InvalidConfig => write!(f, "invalid configuration"),
            StorageErrorKind::InvalidRequest => write!(f, "invalid request"),
            StorageErrorKind::Unsupported => write!(f, "unsupported operation"),
            StorageErrorKind::Protocol => write!(f, "protocol violation"),
            StorageErrorKind::SerializationError => write!(f, "serialization error"),
            StorageErrorKind::Other => write!(f, "other error"),
        }
    }
}

#[derive(Debug)]
struct ErrorTrace {
    /// Captured backtrace, subject to `RUST_BACKTRACE`.
    backtrace: Backtrace,

    /// The tracing span context at the point the error was created.
    span_trace: SpanTrace,
}

impl ErrorTrace {
    #[track_caller]
    fn capture() -> Self {
        ErrorTrace {
            backtrace: Backtrace::capture(),
            span_trace: SpanTrace::capture(),
        }
    }
}

/// Storage error with a semantic kind, operation context and captured traces.
///
/// # Example
///
/// ```rust
/// use storage_driver::{Resource, StorageError, StorageErrorKind};
///
/// let error = StorageError::builder(
///     "oci",
///     StorageErrorKind::Unsupported,
///     "resource category is not supported",
/// )
/// .resource(Resource::EccState)
/// .build();
///
/// assert_eq!(error.kind(), StorageErrorKind::Unsupported);
/// assert_eq!(error.resource(), Some(Resource::EccState));
/// ```
#[derive(Debug)]
pub struct StorageError {
    kind: StorageErrorKind,

    /// The name of the storage engine that produced this error.
    engine: &'static str,

    resource: Option<Resource>,

    /// The object key, if applicable.
    key: Option<String>,

    context: Option<String>,

    source: Box<dyn StdError + Send + Sync + 'static>,

    traces: Box<ErrorTrace>,
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(self.source.as_ref())
    }
}

impl StorageError {
    /// Create a new storage error with the minimum required information.
    ///
    /// For more control, use [`StorageError::builder`].
    pub fn new<E>(engine: &'static str, kind: StorageErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Self {
            kind,
            engine,
            resource: None,
            key: None,
            context: None,
            source: error.into(),
            traces: Box::new(ErrorTrace::capture()),
        }
    }

    /// Create a builder for a storage error with additional context.
    pub fn builder<E>(engine: &'static str, kind: StorageErrorKind, error: E) -> StorageErrorBuilder
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        StorageErrorBuilder {
            engine,
            kind,
            source: error.into(),
            resource: None,
            key: None,
            context: None,
        }
    }

    /// Returns a boxed closure that creates a storage error from a downstream error.
    ///
    /// This is useful with `.map_err()` for simple error conversion.
    ///
    /// ```rust
    /// use storage_driver::{StorageError, StorageErrorKind};
    ///
    /// fn parse(port: &str) -> Result<u16, StorageError> {
    ///     port.parse::<u16>()
    ///         .map_err(StorageError::with("oci", StorageErrorKind::InvalidConfig))
    /// }
    ///
    /// assert!(parse("five thousand").is_err());
    /// ```
    pub fn with<E>(
        engine: &'static str,
        kind: StorageErrorKind,
    ) -> Box<dyn FnOnce(E) -> StorageError + Send + Sync>
    where
        E: Into<Box<dyn StdError + Send + Sync + 'static>>,
    {
        Box::new(move |error: E| StorageError::new(engine, kind, error))
    }

    /// Returns the error kind.
    pub fn kind(&self) -> StorageErrorKind {
        self.kind
    }

    /// Returns the storage engine name.
    pub fn engine(&self) -> &'static str {
        self.engine
    }

    /// Returns the resource category, if available.
    pub fn resource(&self) -> Option<Resource> {
        self.resource
    }

    /// Returns the object key, if available.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    /// Returns additional context, if available.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns true if the object was not found.
    pub fn is_not_found(&self) -> bool {
        self.kind == StorageErrorKind::NotFound
    }

    /// Returns whether this error is likely transient.
    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Returns a reference to the captured backtrace.
    pub fn backtrace(&self) -> &Backtrace {
        &self.traces.backtrace
    }

    /// Returns a reference to the captured span trace.
    pub fn span_trace(&self) -> &SpanTrace {
        &self.traces.span_trace
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Storage error [{}] from {}", self.kind, self.engine)?;

        if let Some(resource) = &self.resource {
            write!(f, " (resource: {})", resource)?;
        }

        if let Some(key) = &self.key {
            write!(f, " (key: {})", key)?;
        }

        if let Some(context) = &self.context {
            write!(f, " ({})", context)?;
        }

        write!(f, ": {}", self.source)
    }
}

/// Builder for a [`StorageError`] with optional context fields.
#[derive(Debug)]
pub struct StorageErrorBuilder {
    kind: StorageErrorKind,
    engine: &'static str,
    source: Box<dyn StdError + Send + Sync + 'static>,
    resource: Option<Resource>,
    key: Option<String>,
    context: Option<String>,
}

impl StorageErrorBuilder {
    /// Set the resource category.
    pub fn resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }

    /// Set the object key.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Set additional context.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Build the `StorageError`.
    pub fn build(self) -> StorageError {
        StorageError {
            kind: self.kind,
            engine: self.engine,
            resource: self.resource,
            key: self.key,
            context: self.context,
            source: self.source,
            traces: Box::new(ErrorTrace::capture()),
        }
    }
}
