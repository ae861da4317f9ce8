//! The partition of the repository tag space.
//!
//! Every object lives under a tag `<prefix><hex key>`, where the prefix names
//! its resource category. The store configuration lives under the reserved
//! tag `CONFIG`, which can never be confused with an object tag since it has
//! no category prefix.

use std::fmt;

use storage_driver::{Mac, Resource, MAC_LENGTH};

/// The tag holding the store configuration.
pub const CONFIG_TAG: &str = "CONFIG";

/// A tag in the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// The reserved configuration tag.
    Config,

    /// An object in a resource category.
    Resource {
        /// The object's category.
        resource: Resource,
        /// The object's key.
        mac: Mac,
    },
}

impl Tag {
    /// The tag for an object, or `None` if the category isn't stored here.
    pub fn resource(resource: Resource, mac: Mac) -> Option<Self> {
        prefix(resource).map(|_| Tag::Resource { resource, mac })
    }

    /// Recover the key from a listed tag in the given category.
    ///
    /// Returns `None` for tags in other categories, the reserved tag, and
    /// tags whose suffix is not exactly a hex encoded key.
    pub fn parse(tag: &str, resource: Resource) -> Option<Mac> {
        let hex = tag.strip_prefix(prefix(resource)?)?;
        if hex.len() != MAC_LENGTH * 2 {
            return None;
        }
        Mac::from_hex(hex).ok()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Config => f.write_str(CONFIG_TAG),
            Tag::Resource { resource, mac } => {
                // Only constructed for categories with a prefix.
                let prefix = prefix(*resource).unwrap_or_default();
                write!(f, "{prefix}{mac}")
            }
        }
    }
}

/// The tag prefix of a resource category.
pub fn prefix(resource: Resource) -> Option<&'static str> {
    match resource {
        Resource::Packfile => Some("packfiles-"),
        Resource::State => Some("state-"),
        Resource::Lock => Some("locks-"),
        _ => None,
    }
}
