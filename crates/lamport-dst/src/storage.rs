//! Simulated state store
//!
//! TigerStyle: Real store underneath, faults and scheduling jitter on top.
//!
//! Every operation first yields to the tokio scheduler a seeded number of
//! times, then consults the fault injector, then delegates to a
//! [`MemoryStore`]. Yielding inside storage calls reorders actor tasks
//! without touching the runtime itself.

use crate::fault::{FaultInjector, FaultType};
use crate::rng::DeterministicRng;
use async_trait::async_trait;
use bytes::Bytes;
use lamport_core::{ActorId, Error, Result, DST_YIELDS_COUNT_MAX};
use lamport_storage::{ContentHash, MemoryStore, StateStore};
use std::sync::Arc;

const READ_FAULTS: &[FaultType] = &[FaultType::StorageReadFail, FaultType::StorageCorruption];
const WRITE_FAULTS: &[FaultType] = &[FaultType::StorageWriteFail];
const CHUNK_READ_FAULTS: &[FaultType] = &[FaultType::StorageReadFail, FaultType::ChunkLoss];
const FLUSH_FAULTS: &[FaultType] = &[FaultType::FlushFail];

/// Fault-injecting [`StateStore`] for simulations
#[derive(Clone)]
pub struct SimStore {
    inner: MemoryStore,
    faults: Arc<FaultInjector>,
    rng: DeterministicRng,
    yields_max: u64,
}

impl SimStore {
    pub fn new(rng: DeterministicRng, faults: Arc<FaultInjector>) -> Self {
        Self {
            inner: MemoryStore::new(),
            faults,
            rng,
            yields_max: 0,
        }
    }

    /// Yield up to `yields_max` times before each operation
    pub fn with_yield_jitter(mut self, yields_max: u64) -> Self {
        assert!(
            yields_max <= DST_YIELDS_COUNT_MAX,
            "yields_max {} exceeds {}",
            yields_max,
            DST_YIELDS_COUNT_MAX
        );
        self.yields_max = yields_max;
        self
    }

    /// The fault-free store underneath, for inspection
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    async fn jitter(&self) {
        if self.yields_max == 0 {
            return;
        }
        let yields = self.rng.next_range(0, self.yields_max + 1);
        for _ in 0..yields {
            tokio::task::yield_now().await;
        }
    }

    async fn enter(&self, operation: &str, applicable: &[FaultType]) -> Option<FaultType> {
        self.jitter().await;
        self.faults.should_inject(operation, applicable)
    }

    fn corrupted(&self) -> Bytes {
        let mut garbage = [0u8; 16];
        self.rng.fill_bytes(&mut garbage);
        // Never valid JSON: records always start with '{'
        garbage[0] = 0xFF;
        Bytes::copy_from_slice(&garbage)
    }
}

fn injected(fault: FaultType) -> String {
    format!("injected {}", fault.name())
}

#[async_trait]
impl StateStore for SimStore {
    async fn get(&self, id: &ActorId) -> Result<Option<Bytes>> {
        match self.enter("get", READ_FAULTS).await {
            Some(FaultType::StorageCorruption) => match self.inner.get(id).await? {
                Some(_) => Ok(Some(self.corrupted())),
                None => Ok(None),
            },
            Some(fault) => Err(Error::storage_read_failed(id.to_hex(), injected(fault))),
            None => self.inner.get(id).await,
        }
    }

    async fn set(&self, id: &ActorId, state: Bytes) -> Result<()> {
        if let Some(fault) = self.enter("set", WRITE_FAULTS).await {
            return Err(Error::storage_write_failed(id.to_hex(), injected(fault)));
        }
        self.inner.set(id, state).await
    }

    async fn delete(&self, id: &ActorId) -> Result<()> {
        if let Some(fault) = self.enter("delete", WRITE_FAULTS).await {
            return Err(Error::storage_write_failed(id.to_hex(), injected(fault)));
        }
        self.inner.delete(id).await
    }

    async fn list_actors(&self) -> Result<Vec<ActorId>> {
        self.jitter().await;
        self.inner.list_actors().await
    }

    async fn put_chunk(&self, chunk: Bytes) -> Result<ContentHash> {
        if let Some(fault) = self.enter("put_chunk", WRITE_FAULTS).await {
            return Err(Error::storage_write_failed("chunk", injected(fault)));
        }
        self.inner.put_chunk(chunk).await
    }

    async fn get_chunk(&self, hash: &ContentHash) -> Result<Option<Bytes>> {
        match self.enter("get_chunk", CHUNK_READ_FAULTS).await {
            Some(FaultType::ChunkLoss) => Ok(None),
            Some(fault) => Err(Error::storage_read_failed(hash.to_string(), injected(fault))),
            None => self.inner.get_chunk(hash).await,
        }
    }

    async fn flush(&self) -> Result<ContentHash> {
        if let Some(fault) = self.enter("flush", FLUSH_FAULTS).await {
            return Err(Error::storage_write_failed("root", injected(fault)));
        }
        self.inner.flush().await
    }
}
