//! # Storage driver
//!
//! The contract between the host runtime and a storage backend: the [`Store`]
//! trait, its addressing types, and a backend-independent error taxonomy.

mod error;
mod resource;
mod store;

pub use error::{StorageError, StorageErrorBuilder, StorageErrorKind};
pub use resource::{Mac, Mode, ParseMacError, Range, Resource, MAC_LENGTH};
pub use store::{Download, Reader, Store, Upload};
