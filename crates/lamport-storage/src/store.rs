//! State store trait
//!
//! TigerStyle: Explicit operations, bounded sizes.

use crate::hash::ContentHash;
use async_trait::async_trait;
use bytes::Bytes;
use lamport_core::{ActorId, Result};

/// Persistent home of actor records and code chunks
///
/// Writes are visible to subsequent reads immediately; `flush` seals the
/// current contents into a merkle root. Implementations must be
/// deterministic: the same sequence of writes yields the same root.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Get an actor record
    async fn get(&self, id: &ActorId) -> Result<Option<Bytes>>;

    /// Write an actor record
    async fn set(&self, id: &ActorId, state: Bytes) -> Result<()>;

    /// Delete an actor record
    async fn delete(&self, id: &ActorId) -> Result<()>;

    /// Check if an actor record exists
    async fn exists(&self, id: &ActorId) -> Result<bool> {
        Ok(self.get(id).await?.is_some())
    }

    /// Ids of all stored actor records, in id order
    async fn list_actors(&self) -> Result<Vec<ActorId>>;

    /// Store a code chunk under its content hash
    async fn put_chunk(&self, chunk: Bytes) -> Result<ContentHash>;

    /// Fetch a code chunk by content hash
    async fn get_chunk(&self, hash: &ContentHash) -> Result<Option<Bytes>>;

    /// Seal the current contents and return the merkle root
    async fn flush(&self) -> Result<ContentHash>;
}
