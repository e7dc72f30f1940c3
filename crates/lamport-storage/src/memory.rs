//! In-memory state store
//!
//! For tests, DST simulations, and single-process embedding.
//!
//! TigerStyle: Ordered maps only, so the flushed root never depends on
//! insertion order or hasher seeds.

use crate::hash::{merkle_link, merkle_link_parts, merkle_root, ContentHash};
use crate::store::StateStore;
use async_trait::async_trait;
use bytes::Bytes;
use lamport_core::{ActorId, Error, Result, ACTOR_STATE_SIZE_BYTES_MAX};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// Domain separators so an actor record can never collide with a chunk leaf
const LEAF_PREFIX_ACTOR: &[u8] = b"actor:";
const LEAF_PREFIX_CHUNK: &[u8] = b"chunk:";

#[derive(Debug, Default)]
struct StoreData {
    actors: BTreeMap<ActorId, Bytes>,
    chunks: BTreeMap<ContentHash, Bytes>,
    last_root: Option<ContentHash>,
    flush_count: u64,
}

impl StoreData {
    fn compute_root(&self) -> ContentHash {
        let actor_leaves: Vec<ContentHash> = self
            .actors
            .iter()
            .map(|(id, state)| {
                merkle_link_parts(&[LEAF_PREFIX_ACTOR, id.as_bytes(), merkle_link(state).as_bytes()])
            })
            .collect();
        let chunk_leaves: Vec<ContentHash> = self
            .chunks
            .keys()
            .map(|hash| merkle_link_parts(&[LEAF_PREFIX_CHUNK, hash.as_bytes()]))
            .collect();

        let actors_root = merkle_root(&actor_leaves);
        let chunks_root = merkle_root(&chunk_leaves);
        merkle_link_parts(&[actors_root.as_bytes(), chunks_root.as_bytes()])
    }
}

/// In-memory state store
#[derive(Clone, Default)]
pub struct MemoryStore {
    data: Arc<RwLock<StoreData>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Root returned by the most recent flush
    pub async fn last_root(&self) -> Option<ContentHash> {
        self.data.read().await.last_root
    }

    /// Number of flushes performed
    pub async fn flush_count(&self) -> u64 {
        self.data.read().await.flush_count
    }

    /// Number of stored actor records
    pub async fn actor_count(&self) -> usize {
        self.data.read().await.actors.len()
    }

    /// Number of stored code chunks
    pub async fn chunk_count(&self) -> usize {
        self.data.read().await.chunks.len()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    #[instrument(skip(self), fields(actor_id = %id.short()), level = "trace")]
    async fn get(&self, id: &ActorId) -> Result<Option<Bytes>> {
        let data = self.data.read().await;
        Ok(data.actors.get(id).cloned())
    }

    #[instrument(skip(self, state), fields(actor_id = %id.short(), state_len = state.len()), level = "trace")]
    async fn set(&self, id: &ActorId, state: Bytes) -> Result<()> {
        if state.len() > ACTOR_STATE_SIZE_BYTES_MAX {
            return Err(Error::ActorStateTooLarge {
                size: state.len(),
                limit: ACTOR_STATE_SIZE_BYTES_MAX,
            });
        }

        let mut data = self.data.write().await;
        data.actors.insert(*id, state);
        Ok(())
    }

    #[instrument(skip(self), fields(actor_id = %id.short()), level = "trace")]
    async fn delete(&self, id: &ActorId) -> Result<()> {
        let mut data = self.data.write().await;
        data.actors.remove(id);
        Ok(())
    }

    async fn list_actors(&self) -> Result<Vec<ActorId>> {
        let data = self.data.read().await;
        Ok(data.actors.keys().copied().collect())
    }

    #[instrument(skip(self, chunk), fields(chunk_len = chunk.len()), level = "trace")]
    async fn put_chunk(&self, chunk: Bytes) -> Result<ContentHash> {
        let hash = merkle_link(&chunk);
        let mut data = self.data.write().await;
        data.chunks.entry(hash).or_insert(chunk);
        Ok(hash)
    }

    async fn get_chunk(&self, hash: &ContentHash) -> Result<Option<Bytes>> {
        let data = self.data.read().await;
        Ok(data.chunks.get(hash).cloned())
    }

    #[instrument(skip(self), level = "debug")]
    async fn flush(&self) -> Result<ContentHash> {
        let mut data = self.data.write().await;
        let root = data.compute_root();
        data.last_root = Some(root);
        data.flush_count += 1;

        debug!(
            root = %root,
            actors = data.actors.len(),
            chunks = data.chunks.len(),
            "Store flushed"
        );
        Ok(root)
    }
}
