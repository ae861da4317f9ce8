use std::fmt;
use std::ops::Deref;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io;

use crate::error::StorageError;
use crate::{Mac, Mode, Range, Resource};

/// A reader stream for object contents supplied by the caller.
pub type Reader<'r> = dyn io::AsyncRead + Unpin + Send + Sync + 'r;

/// An owned reader handed to [`Store::put`].
pub type Upload = Box<Reader<'static>>;

/// A live reader stream for object contents returned by [`Store::get`].
///
/// The caller is responsible for reading it to completion and dropping it.
pub type Download = Pin<Box<dyn io::AsyncRead + Send + 'static>>;

/// A content-addressed object store, as consumed by the host runtime.
///
/// Every operation is a self-contained sequence of calls against the backend.
/// Dropping the returned future cancels the operation in flight.
#[async_trait::async_trait]
pub trait Store: fmt::Debug + Send + Sync {
    /// The name of the storage engine.
    fn name(&self) -> &'static str;

    /// The origin of the store within its engine (e.g. a repository path).
    fn origin(&self) -> &str;

    /// The root address of the backend.
    fn root(&self) -> &str;

    /// Initialize a new store with its configuration blob.
    async fn create(&self, config: Bytes) -> Result<(), StorageError>;

    /// Open an existing store, returning its configuration blob.
    async fn open(&self) -> Result<Bytes, StorageError>;

    /// The location string that reopens this store.
    async fn location(&self) -> Result<String, StorageError>;

    /// The access modes the store supports.
    async fn mode(&self) -> Result<Mode, StorageError>;

    /// The total size of the store in bytes, if it can be known.
    async fn size(&self) -> Result<Option<u64>, StorageError>;

    /// List all keys stored under a resource category.
    async fn list(&self, resource: Resource) -> Result<Vec<Mac>, StorageError>;

    /// Store an object, returning the number of bytes written.
    async fn put(&self, resource: Resource, mac: Mac, reader: Upload)
        -> Result<u64, StorageError>;

    /// Fetch an object, optionally restricted to a byte range.
    async fn get(
        &self,
        resource: Resource,
        mac: Mac,
        range: Option<Range>,
    ) -> Result<Download, StorageError>;

    /// Delete an object.
    async fn delete(&self, resource: Resource, mac: Mac) -> Result<(), StorageError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), StorageError>;

    /// Release any resources held by the store.
    async fn close(&self) -> Result<(), StorageError>;
}

#[async_trait::async_trait]
impl<S> Store for Arc<S>
where
    S: ?Sized + Store,
{
    fn name(&self) -> &'static str {
        self.deref().name()
    }

    fn origin(&self) -> &str {
        self.deref().origin()
    }

    fn root(&self) -> &str {
        self.deref().root()
    }

    async fn create(&self, config: Bytes) -> Result<(), StorageError> {
        self.deref().create(config).await
    }

    async fn open(&self) -> Result<Bytes, StorageError> {
        self.deref().open().await
    }

    async fn location(&self) -> Result<String, StorageError> {
        self.deref().location().await
    }

    async fn mode(&self) -> Result<Mode, StorageError> {
        self.deref().mode().await
    }

    async fn size(&self) -> Result<Option<u64>, StorageError> {
        self.deref().size().await
    }

    async fn list(&self, resource: Resource) -> Result<Vec<Mac>, StorageError> {
        self.deref().list(resource).await
    }

    async fn put(
        &self,
        resource: Resource,
        mac: Mac,
        reader: Upload,
    ) -> Result<u64, StorageError> {
        self.deref().put(resource, mac, reader).await
    }

    async fn get(
        &self,
        resource: Resource,
        mac: Mac,
        range: Option<Range>,
    ) -> Result<Download, StorageError> {
        self.deref().get(resource, mac, range).await
    }

    async fn delete(&self, resource: Resource, mac: Mac) -> Result<(), StorageError> {
        self.deref().delete(resource, mac).await
    }

    async fn ping(&self) -> Result<(), StorageError> {
        self.deref().ping().await
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.deref().close().await
    }
}
