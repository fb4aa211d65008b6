use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Length of a SHA-1 object hash in bytes.
pub const OBJECT_ID_LEN: usize = 20;

/// Content-addressed identifier for a packed object.
///
/// An `ObjectId` is the raw 20-byte SHA-1 hash git assigns to an object. It
/// is displayed and parsed as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId([u8; OBJECT_ID_LEN]);

impl ObjectId {
    /// Create an `ObjectId` from a pre-computed hash.
    pub const fn from_hash(hash: [u8; OBJECT_ID_LEN]) -> Self {
        Self(hash)
    }

    /// Create an `ObjectId` from a slice that must be exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, TypeError> {
        let arr: [u8; OBJECT_ID_LEN] =
            bytes.try_into().map_err(|_| TypeError::InvalidLength {
                expected: OBJECT_ID_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(arr))
    }

    /// The raw 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_LEN] {
        &self.0
    }

    /// Hex-encoded string representation.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 7 hex characters, as git abbreviates.
    fn short_hex(&self) -> String {
        let mut s = hex::encode(&self.0[..4]);
        s.truncate(7);
        s
    }

    /// Parse from a 40-character hex string.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.short_hex())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; OBJECT_ID_LEN]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_LEN]) -> Self {
        Self(bytes)
    }
}

impl From<ObjectId> for [u8; OBJECT_ID_LEN] {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

/// Object type carried in bits 4-6 of a pack entry's first header byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    Commit,
    Tree,
    Blob,
    Tag,
    /// Delta against a base at a backward byte distance in the same pack.
    OfsDelta,
    /// Delta against a base named by its object hash.
    RefDelta,
}

impl ObjectKind {
    /// Parse the 3-bit type code. Codes 0 and 5 are reserved.
    pub fn from_code(code: u8) -> Result<Self, TypeError> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            6 => Ok(Self::OfsDelta),
            7 => Ok(Self::RefDelta),
            other => Err(TypeError::InvalidTypeCode(other)),
        }
    }

    /// The 3-bit type code.
    pub fn code(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
            Self::OfsDelta => 6,
            Self::RefDelta => 7,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Commit => write!(f, "commit"),
            Self::Tree => write!(f, "tree"),
            Self::Blob => write!(f, "blob"),
            Self::Tag => write!(f, "tag"),
            Self::OfsDelta => write!(f, "ofs-delta"),
            Self::RefDelta => write!(f, "ref-delta"),
        }
    }
}

/// Position of one object within a numbered pack file.
///
/// `pack` indexes the owning store's ordered list of pack base names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectLocation {
    pub offset: u64,
    pub pack: u32,
}

impl ObjectLocation {
    pub const fn new(pack: u32, offset: u64) -> Self {
        Self { offset, pack }
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pack#{}@{}", self.pack, self.offset)
    }
}
