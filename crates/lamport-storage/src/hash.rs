//! Content hashing and merkle links
//!
//! TigerStyle: One hash function, fixed-width digests, no recursion.
//!
//! `merkle_link` is the primitive the hypervisor uses to derive actor ids and
//! the store uses to address code chunks. `merkle_root` folds an ordered list
//! of leaf hashes into a single root, pairwise, level by level.

use lamport_core::{ActorId, Error, Result, ACTOR_ID_LENGTH_BYTES};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a content hash in bytes
pub const CONTENT_HASH_LENGTH_BYTES: usize = 32;

const _: () = {
    assert!(CONTENT_HASH_LENGTH_BYTES == ACTOR_ID_LENGTH_BYTES);
};

/// SHA-256 digest addressing a piece of content
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct ContentHash([u8; CONTENT_HASH_LENGTH_BYTES]);

impl ContentHash {
    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; CONTENT_HASH_LENGTH_BYTES] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::DeserializationFailed {
            reason: format!("content hash {}: {}", s, e),
        })?;
        let array: [u8; CONTENT_HASH_LENGTH_BYTES] =
            bytes
                .as_slice()
                .try_into()
                .map_err(|_| Error::DeserializationFailed {
                    reason: format!("content hash {} has {} bytes", s, bytes.len()),
                })?;
        Ok(Self(array))
    }

    /// Reinterpret this digest as an actor id
    pub fn to_actor_id(self) -> ActorId {
        ActorId::from_bytes(self.0)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", &self.to_hex()[..8])
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ContentHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(de::Error::custom)
    }
}

/// Hash arbitrary bytes into a merkle link
pub fn merkle_link(bytes: &[u8]) -> ContentHash {
    let digest = Sha256::digest(bytes);
    ContentHash(digest.into())
}

/// Hash the concatenation of several byte slices without allocating
pub fn merkle_link_parts(parts: &[&[u8]]) -> ContentHash {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    ContentHash(hasher.finalize().into())
}

/// Fold ordered leaves into a single root
///
/// An odd node at the end of a level is carried up unchanged. The root of no
/// leaves is the hash of the empty string.
pub fn merkle_root(leaves: &[ContentHash]) -> ContentHash {
    if leaves.is_empty() {
        return merkle_link(&[]);
    }

    let mut level: Vec<ContentHash> = leaves.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            match pair {
                [left, right] => next.push(merkle_link_parts(&[&left.0, &right.0])),
                [single] => next.push(*single),
                _ => unreachable!("chunks(2) yields one or two elements"),
            }
        }
        debug_assert!(next.len() < level.len());
        level = next;
    }

    level[0]
}
