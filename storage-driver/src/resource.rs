//! Addressing types shared by every store: resource categories, content keys,
//! byte ranges and access modes.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

use thiserror::Error;

/// The length of a content key in bytes.
pub const MAC_LENGTH: usize = 32;

/// A logical partition of the objects held by a store.
///
/// The host knows about more categories than any single backend is required
/// to support. Backends reject the categories they don't handle with
/// [`StorageErrorKind::Unsupported`](crate::StorageErrorKind::Unsupported).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Resource {
    /// Packed object data.
    Packfile,

    /// Repository state snapshots.
    State,

    /// Repository locks.
    Lock,

    /// Error-correction data for packfiles.
    EccPackfile,

    /// Error-correction data for states.
    EccState,

    /// The repository configuration blob.
    Config,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Packfile => f.write_str("packfile"),
            Resource::State => f.write_str("state"),
            Resource::Lock => f.write_str("lock"),
            Resource::EccPackfile => f.write_str("ecc-packfile"),
            Resource::EccState => f.write_str("ecc-state"),
            Resource::Config => f.write_str("config"),
        }
    }
}

/// The key could not be decoded from its hexadecimal form.
#[derive(Debug, Error)]
pub enum ParseMacError {
    /// The input was not valid hexadecimal.
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// The input decoded to the wrong number of bytes.
    #[error("expected {MAC_LENGTH} bytes, got {0}")]
    Length(usize),
}

/// A 256-bit content key.
///
/// Displays as 64 lowercase hexadecimal characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac([u8; MAC_LENGTH]);

impl Mac {
    /// Wrap raw key bytes.
    pub const fn new(bytes: [u8; MAC_LENGTH]) -> Self {
        Mac(bytes)
    }

    /// The raw key bytes.
    pub fn as_bytes(&self) -> &[u8; MAC_LENGTH] {
        &self.0
    }

    /// Decode a key from its hexadecimal form, requiring exactly 32 bytes.
    pub fn from_hex(s: &str) -> Result<Self, ParseMacError> {
        let bytes = hex::decode(s)?;
        let bytes: [u8; MAC_LENGTH] = bytes
            .try_into()
            .map_err(|bytes: Vec<u8>| ParseMacError::Length(bytes.len()))?;
        Ok(Mac(bytes))
    }
}

impl From<[u8; MAC_LENGTH]> for Mac {
    fn from(value: [u8; MAC_LENGTH]) -> Self {
        Mac(value)
    }
}

impl AsRef<[u8]> for Mac {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({self})")
    }
}

impl FromStr for Mac {
    type Err = ParseMacError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mac::from_hex(s)
    }
}

/// A byte range within a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Range {
    /// Offset of the first byte.
    pub offset: u64,

    /// Number of bytes to read.
    pub length: u32,
}

impl Range {
    /// Create a new range.
    pub fn new(offset: u64, length: u32) -> Self {
        Range { offset, length }
    }

    /// The offset of the last byte in the range, inclusive.
    ///
    /// Returns `None` for an empty range.
    pub fn last(&self) -> Option<u64> {
        if self.length == 0 {
            return None;
        }
        self.offset.checked_add(u64::from(self.length) - 1)
    }
}

/// The access modes supported by a store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mode(u8);

impl Mode {
    /// Objects can be read.
    pub const READ: Mode = Mode(0b01);

    /// Objects can be written and deleted.
    pub const WRITE: Mode = Mode(0b10);

    /// No access.
    pub const fn empty() -> Self {
        Mode(0)
    }

    /// Returns true if every flag in `other` is set in `self`.
    pub const fn contains(self, other: Mode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Mode {
    type Output = Mode;

    fn bitor(self, rhs: Self) -> Self::Output {
        Mode(self.0 | rhs.0)
    }
}

impl BitOrAssign for Mode {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut set = f.debug_set();
        if self.contains(Mode::READ) {
            set.entry(&"READ");
        }
        if self.contains(Mode::WRITE) {
            set.entry(&"WRITE");
        }
        set.finish()
    }
}
