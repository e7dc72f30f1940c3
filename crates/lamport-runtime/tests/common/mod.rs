//! Shared fixtures for runtime integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use lamport_core::{ActorId, Result};
use lamport_runtime::{ActorContext, Container, Hypervisor, Message};
use lamport_storage::{MemoryStore, StateStore};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Upper bound on any single scenario
pub const SCENARIO_TIMEOUT: Duration = Duration::from_secs(10);

/// Run a future, failing the test if it hangs
pub async fn within<F: Future>(future: F) -> F::Output {
    match tokio::time::timeout(SCENARIO_TIMEOUT, future).await {
        Ok(output) => output,
        Err(_) => panic!("scenario did not finish within {:?}", SCENARIO_TIMEOUT),
    }
}

/// Ordered log shared between a test and the containers it runs
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.entries.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().unwrap().clone()
    }
}

/// Records the payload of every delivered message
pub struct Recorder {
    pub journal: Journal,
}

#[async_trait]
impl Container for Recorder {
    async fn on_message(&mut self, _ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
        self.journal
            .push(String::from_utf8_lossy(message.data()).into_owned());
        Ok(Bytes::new())
    }
}

/// Read an actor's persisted record as JSON
pub async fn stored_record(store: &MemoryStore, id: &ActorId) -> Option<serde_json::Value> {
    let bytes = store.get(id).await.unwrap()?;
    Some(serde_json::from_slice(&bytes).unwrap())
}

/// Hypervisor over a fresh in-memory store
pub fn hypervisor_with_store() -> (Hypervisor, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let hypervisor = Hypervisor::builder()
        .with_store(store.clone())
        .build()
        .unwrap();
    (hypervisor, store)
}

pub fn text(data: &Bytes) -> String {
    String::from_utf8_lossy(data).into_owned()
}
