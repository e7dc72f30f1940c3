//! Code blob chunking
//!
//! TigerStyle: Bounded chunk counts, explicit size threshold.
//!
//! Code at or below the chunk size is stored inline in the actor record.
//! Anything larger is split into fixed-size fragments, each stored under its
//! content hash, and the record keeps the ordered list of links.

use crate::hash::ContentHash;
use crate::store::StateStore;
use bytes::Bytes;
use lamport_core::{Error, Result, CODE_CHUNKS_COUNT_MAX};
use serde::{Deserialize, Serialize};

/// How an actor's code is referenced from its record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeLink {
    /// Code stored in the record itself (hex encoded)
    Inline(#[serde(with = "hex_bytes")] Bytes),
    /// Code split into fragments, in order
    Chunked(Vec<ContentHash>),
}

impl CodeLink {
    /// Number of fragments referenced (0 for inline code)
    pub fn chunk_count(&self) -> usize {
        match self {
            CodeLink::Inline(_) => 0,
            CodeLink::Chunked(links) => links.len(),
        }
    }
}

/// Split a blob into fragments of at most `chunk_size_bytes`
pub fn split(code: &Bytes, chunk_size_bytes: usize) -> Vec<Bytes> {
    assert!(chunk_size_bytes > 0, "chunk size must be positive");

    let mut chunks = Vec::with_capacity(code.len().div_ceil(chunk_size_bytes));
    let mut offset = 0;
    while offset < code.len() {
        let end = (offset + chunk_size_bytes).min(code.len());
        chunks.push(code.slice(offset..end));
        offset = end;
    }

    debug_assert_eq!(chunks.iter().map(Bytes::len).sum::<usize>(), code.len());
    chunks
}

/// Persist code, chunking it if it exceeds `chunk_size_bytes`
pub async fn store_code(
    store: &dyn StateStore,
    code: &Bytes,
    chunk_size_bytes: usize,
) -> Result<CodeLink> {
    if code.len() <= chunk_size_bytes {
        return Ok(CodeLink::Inline(code.clone()));
    }

    let chunks_count = code.len().div_ceil(chunk_size_bytes);
    if chunks_count > CODE_CHUNKS_COUNT_MAX {
        return Err(Error::CodeTooLarge {
            size: code.len(),
            chunks: chunks_count,
            limit: CODE_CHUNKS_COUNT_MAX.saturating_mul(chunk_size_bytes),
        });
    }

    let chunks = split(code, chunk_size_bytes);
    debug_assert_eq!(chunks.len(), chunks_count);

    let mut links = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        links.push(store.put_chunk(chunk).await?);
    }
    Ok(CodeLink::Chunked(links))
}

/// Reassemble code from its link
pub async fn load_code(store: &dyn StateStore, link: &CodeLink) -> Result<Bytes> {
    match link {
        CodeLink::Inline(code) => Ok(code.clone()),
        CodeLink::Chunked(links) => {
            let mut code = Vec::new();
            for hash in links {
                let chunk = store
                    .get_chunk(hash)
                    .await?
                    .ok_or_else(|| Error::ChunkNotFound {
                        hash: hash.to_hex(),
                    })?;
                code.extend_from_slice(&chunk);
            }
            Ok(Bytes::from(code))
        }
    }
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map(Bytes::from).map_err(de::Error::custom)
    }
}
