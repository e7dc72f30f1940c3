//! Actor identity types for Lamport
//!
//! TigerStyle: Explicit types, assertions, bounded operations.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Application-chosen correlation key carried by capabilities and messages
pub type Tag = u64;

// =============================================================================
// ActorId
// =============================================================================

/// Content-derived identifier for an actor
///
/// Actor IDs are merkle links over `{nonce, parent}`, so the same creation
/// history always yields the same id. Ordering is byte-lexicographic, which
/// the message arbiter relies on for tie-breaking.
///
/// # TigerStyle
/// - Fixed length, validated on parse
/// - Immutable and `Copy`
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ActorId([u8; ACTOR_ID_LENGTH_BYTES]);

impl ActorId {
    /// Wrap a digest as an actor id
    pub fn from_bytes(bytes: [u8; ACTOR_ID_LENGTH_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parse an actor id from a byte slice
    ///
    /// # Errors
    /// Returns error if the slice is not exactly `ACTOR_ID_LENGTH_BYTES` long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let array: [u8; ACTOR_ID_LENGTH_BYTES] =
            bytes.try_into().map_err(|_| Error::InvalidActorId {
                id: hex::encode(bytes),
                reason: format!(
                    "length {} is not {} bytes",
                    bytes.len(),
                    ACTOR_ID_LENGTH_BYTES
                ),
            })?;
        Ok(Self(array))
    }

    /// Parse an actor id from its hex rendering
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidActorId {
            id: s.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_slice(&bytes)
    }

    /// Raw id bytes
    pub fn as_bytes(&self) -> &[u8; ACTOR_ID_LENGTH_BYTES] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Short hex prefix for log lines
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.short())
    }
}

impl Serialize for ActorId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

// =============================================================================
// ContainerType
// =============================================================================

/// Identifier under which a container factory is registered
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContainerType(u32);

impl ContainerType {
    /// Create a container type id
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Numeric type id
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
