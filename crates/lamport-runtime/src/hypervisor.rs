//! Hypervisor: actor creation, message routing, checkpoints
//!
//! TigerStyle: Single entry point, explicit configuration, bounded retries.
//!
//! The hypervisor owns the state store, the scheduler and the container
//! registry. It creates actors, routes messages to resident actors (loading
//! them from storage on demand), and produces checkpoints: wait for the tick
//! horizon, collect unreachable actors, flush the store to a merkle root.

use crate::actor::{derive_actor_id, Actor, ActorRecord, ActorState, ActorTask};
use crate::capability::Capability;
use crate::container::ContainerFactory;
use crate::context::ActorContext;
use crate::gc::{self, GcReport};
use crate::message::Message;
use crate::scheduler::{Instance, Scheduler};
use bytes::Bytes;
use lamport_core::{ActorId, ContainerType, Error, LamportConfig, Result};
use lamport_storage::{load_code, store_code, ContentHash, MemoryStore, StateStore};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, instrument, trace};

/// Result of a checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Merkle root of the flushed store
    pub root: ContentHash,
    /// What the collector did before the flush
    pub gc: GcReport,
}

struct HypervisorInner {
    store: Arc<dyn StateStore>,
    scheduler: Scheduler,
    containers: RwLock<BTreeMap<ContainerType, Arc<dyn ContainerFactory>>>,
    nonce: AtomicU64,
    candidates: Mutex<BTreeSet<ActorId>>,
    config: LamportConfig,
}

/// Deterministic actor hypervisor
#[derive(Clone)]
pub struct Hypervisor {
    inner: Arc<HypervisorInner>,
}

impl Hypervisor {
    /// Create a hypervisor over `store`
    pub fn new(store: Arc<dyn StateStore>, config: LamportConfig) -> Result<Self> {
        config.validate()?;
        let nonce = config.hypervisor.nonce_initial;
        Ok(Self {
            inner: Arc::new(HypervisorInner {
                store,
                scheduler: Scheduler::new(),
                containers: RwLock::new(BTreeMap::new()),
                nonce: AtomicU64::new(nonce),
                candidates: Mutex::new(BTreeSet::new()),
                config,
            }),
        })
    }

    /// Start building a hypervisor
    pub fn builder() -> HypervisorBuilder {
        HypervisorBuilder::new()
    }

    /// Register the factory for a container type, replacing any previous one
    pub fn register_container(&self, container_type: ContainerType, factory: impl ContainerFactory) {
        self.register_factory(container_type, Arc::new(factory));
    }

    fn register_factory(&self, container_type: ContainerType, factory: Arc<dyn ContainerFactory>) {
        let mut containers = self
            .inner
            .containers
            .write()
            .unwrap_or_else(|e| e.into_inner());
        containers.insert(container_type, factory);
        debug!(container_type = %container_type, "Container registered");
    }

    pub(crate) fn ensure_registered(&self, container_type: ContainerType) -> Result<Arc<dyn ContainerFactory>> {
        let containers = self
            .inner
            .containers
            .read()
            .unwrap_or_else(|e| e.into_inner());
        containers
            .get(&container_type)
            .cloned()
            .ok_or(Error::ContainerTypeNotRegistered {
                container_type: container_type.as_u32(),
            })
    }

    /// The backing state store
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.inner.store
    }

    /// The shared scheduler
    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Active configuration
    pub fn config(&self) -> &LamportConfig {
        &self.inner.config
    }

    /// Id of the first top-level actor; the collector walks from here
    pub fn root_id(&self) -> ActorId {
        derive_actor_id(0, None)
    }

    /// Whether the actor is currently registered with the scheduler
    pub fn is_resident(&self, id: &ActorId) -> bool {
        self.inner.scheduler.is_registered(id)
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Create a top-level actor and return a capability to it
    #[instrument(skip(self, message), fields(container_type = %container_type), level = "info")]
    pub async fn create_actor(&self, container_type: ContainerType, message: Message) -> Result<Capability> {
        self.create_top_level(container_type, None, message).await
    }

    /// Create a top-level actor carrying a code blob
    #[instrument(skip(self, code, message), fields(container_type = %container_type, code_len = code.len()), level = "info")]
    pub async fn create_actor_with_code(
        &self,
        container_type: ContainerType,
        code: Bytes,
        message: Message,
    ) -> Result<Capability> {
        self.create_top_level(container_type, Some(code), message)
            .await
    }

    async fn create_top_level(
        &self,
        container_type: ContainerType,
        code: Option<Bytes>,
        mut message: Message,
    ) -> Result<Capability> {
        self.ensure_registered(container_type)?;
        let nonce = self.inner.nonce.fetch_add(1, Ordering::SeqCst);
        let id = derive_actor_id(nonce, None);

        message.stamp(0, None, None);
        self.spawn(id, container_type, code, message, 0).await?;
        Ok(Capability::new(id, 0))
    }

    /// Start a freshly created actor whose first hook is `on_creation`
    pub(crate) async fn spawn(
        &self,
        id: ActorId,
        container_type: ContainerType,
        code: Option<Bytes>,
        creation: Message,
        ticks: u64,
    ) -> Result<()> {
        let factory = self.ensure_registered(container_type)?;
        debug_assert!(!self.is_resident(&id), "actor id reused while resident");

        let code_link = match &code {
            Some(code) => Some(
                store_code(
                    self.store().as_ref(),
                    code,
                    self.config().storage.code_chunk_size_bytes,
                )
                .await?,
            ),
            None => None,
        };

        let state = ActorState::new(container_type, code, code_link);
        let actor = Actor::detached(id, ticks, self.scheduler().clone());
        let ctx = ActorContext::new(Arc::clone(&actor), self.clone(), state);
        let task = ActorTask::new(factory.create(&id), ctx, Some(creation));
        actor.start(task, None);

        info!(actor_id = %id.short(), ticks, container_type = %container_type, "Actor created");
        Ok(())
    }

    // =========================================================================
    // Routing
    // =========================================================================

    /// Inject a message from outside the actor system
    #[instrument(skip(self, message), fields(dest_id = %cap.dest_id().short(), tag = cap.tag()), level = "debug")]
    pub async fn send(&self, cap: Capability, mut message: Message) -> Result<()> {
        message.stamp(0, None, Some(cap.tag()));
        self.route(cap.dest_id(), message).await
    }

    /// Deliver a stamped message, loading the destination if needed
    pub(crate) async fn route(&self, dest: ActorId, mut message: Message) -> Result<()> {
        let attempts_max = self.config().hypervisor.delivery_attempts_max;

        for attempt in 0..attempts_max {
            match self.scheduler().get_instance(&dest) {
                Instance::Resident(actor) => match actor.queue(message) {
                    Ok(()) => return Ok(()),
                    Err(returned) => {
                        trace!(dest_id = %dest.short(), attempt, "Handle unloaded, retrying");
                        message = returned;
                    }
                },
                Instance::Loading(mut loaded) => {
                    // Either outcome means the load finished
                    let _ = loaded.changed().await;
                }
                Instance::Absent => {
                    let Some(lock) = self.scheduler().lock(dest) else {
                        continue;
                    };
                    let result = self.load(dest, message).await;
                    drop(lock);
                    return result;
                }
            }
        }

        Err(Error::internal(format!(
            "message to {} undeliverable after {} attempts",
            dest, attempts_max
        )))
    }

    /// Rebuild an actor from its record and start it with `first` queued
    async fn load(&self, id: ActorId, first: Message) -> Result<()> {
        let bytes = self
            .store()
            .get(&id)
            .await?
            .ok_or_else(|| Error::actor_not_found(id.to_hex()))?;
        let record = ActorRecord::decode(&id, &bytes)?;
        let factory = self.ensure_registered(record.container_type)?;

        let code = match &record.code {
            Some(link) => Some(load_code(self.store().as_ref(), link).await?),
            None => None,
        };
        let ticks = record.ticks;
        let state = record.into_state(code);

        let actor = Actor::detached(id, ticks, self.scheduler().clone());
        let mut ctx = ActorContext::new(Arc::clone(&actor), self.clone(), state);
        let mut container = factory.create(&id);
        container.on_startup(&mut ctx).await?;
        actor.start(ActorTask::new(container, ctx, None), Some(first));

        debug!(actor_id = %id.short(), ticks, "Actor loaded");
        Ok(())
    }

    // =========================================================================
    // Checkpoints
    // =========================================================================

    pub(crate) fn flag_collection_candidate(&self, id: ActorId) {
        self.candidates().insert(id);
    }

    fn candidates(&self) -> std::sync::MutexGuard<'_, BTreeSet<ActorId>> {
        self.inner
            .candidates
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    /// Actors flagged for the next collection
    pub fn collection_candidates(&self) -> Vec<ActorId> {
        self.candidates().iter().copied().collect()
    }

    /// Wait for `horizon`, collect garbage, flush, and report both
    #[instrument(skip(self), level = "info")]
    pub async fn checkpoint(&self, horizon: u64) -> Result<Checkpoint> {
        // A dropped sender only happens on shutdown; proceed either way
        let _ = self.scheduler().wait(horizon, None).await;

        let candidates = std::mem::take(&mut *self.candidates());
        let report = match gc::collect(
            self.store().as_ref(),
            self.scheduler(),
            self.root_id(),
            candidates.clone(),
        )
        .await
        {
            Ok(report) => report,
            Err(e) => {
                self.candidates().extend(candidates);
                return Err(e);
            }
        };
        self.candidates().extend(report.deferred.iter().copied());

        let root = self.store().flush().await?;
        info!(
            root = %root,
            horizon,
            collected = report.collected.len(),
            "State root created"
        );
        Ok(Checkpoint { root, gc: report })
    }

    /// Merkle root of the state once every actor has reached `horizon`
    pub async fn create_state_root(&self, horizon: u64) -> Result<ContentHash> {
        Ok(self.checkpoint(horizon).await?.root)
    }

    /// Merkle root of the state once the system has gone quiet
    pub async fn create_state_root_at_quiescence(&self) -> Result<ContentHash> {
        self.create_state_root(u64::MAX).await
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for a [`Hypervisor`]
#[derive(Default)]
pub struct HypervisorBuilder {
    store: Option<Arc<dyn StateStore>>,
    config: LamportConfig,
    containers: BTreeMap<ContainerType, Arc<dyn ContainerFactory>>,
}

impl HypervisorBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state store (defaults to an in-memory store)
    pub fn with_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the configuration
    pub fn with_config(mut self, config: LamportConfig) -> Self {
        self.config = config;
        self
    }

    /// Register a container factory
    pub fn with_container(mut self, container_type: ContainerType, factory: impl ContainerFactory) -> Self {
        self.containers.insert(container_type, Arc::new(factory));
        self
    }

    /// Build the hypervisor
    pub fn build(self) -> Result<Hypervisor> {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let hypervisor = Hypervisor::new(store, self.config)?;
        for (container_type, factory) in self.containers {
            hypervisor.register_factory(container_type, factory);
        }
        Ok(hypervisor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Container for Echo {
        async fn on_message(&mut self, _ctx: &mut ActorContext, message: Message) -> Result<Bytes> {
            Ok(message.data().clone())
        }
    }

    const ECHO: ContainerType = ContainerType::new(1);

    fn echo_factory(_id: &ActorId) -> Box<dyn Container> {
        Box::new(Echo)
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = LamportConfig::default();
        config.hypervisor.delivery_attempts_max = 0;
        let result = Hypervisor::new(Arc::new(MemoryStore::new()), config);
        assert!(matches!(result, Err(Error::InvalidConfiguration { .. })));
    }

    #[tokio::test]
    async fn test_unregistered_container_type() {
        let hypervisor = Hypervisor::builder().build().unwrap();
        let result = hypervisor
            .create_actor(ContainerType::new(9), Message::new("x"))
            .await;
        assert!(matches!(
            result,
            Err(Error::ContainerTypeNotRegistered { container_type: 9 })
        ));
    }

    #[tokio::test]
    async fn test_first_actor_is_root() {
        let hypervisor = Hypervisor::builder()
            .with_container(ECHO, echo_factory)
            .build()
            .unwrap();
        let cap = hypervisor.create_actor(ECHO, Message::new("")).await.unwrap();
        assert_eq!(cap.dest_id(), hypervisor.root_id());
        assert_eq!(cap.tag(), 0);
    }

    #[tokio::test]
    async fn test_nonce_initial_offsets_ids() {
        let mut config = LamportConfig::default();
        config.hypervisor.nonce_initial = 5;
        let hypervisor = Hypervisor::builder()
            .with_config(config)
            .with_container(ECHO, echo_factory)
            .build()
            .unwrap();
        let cap = hypervisor.create_actor(ECHO, Message::new("")).await.unwrap();
        assert_eq!(cap.dest_id(), derive_actor_id(5, None));
    }

    #[tokio::test]
    async fn test_send_to_unknown_actor() {
        let hypervisor = Hypervisor::builder().build().unwrap();
        let ghost = Capability::new(ActorId::from_bytes([7; 32]), 0);
        let result = hypervisor.send(ghost, Message::new("hi")).await;
        assert!(matches!(result, Err(Error::ActorNotFound { .. })));
        assert!(!hypervisor.is_resident(&ghost.dest_id()));
    }

    #[tokio::test]
    async fn test_quiescent_checkpoint_persists_actor() {
        let store = Arc::new(MemoryStore::new());
        let hypervisor = Hypervisor::builder()
            .with_store(store.clone())
            .with_container(ECHO, echo_factory)
            .build()
            .unwrap();
        let cap = hypervisor.create_actor(ECHO, Message::new("")).await.unwrap();

        let checkpoint = hypervisor.checkpoint(u64::MAX).await.unwrap();
        assert!(store.exists(&cap.dest_id()).await.unwrap());
        assert_eq!(store.last_root().await, Some(checkpoint.root));
        assert_eq!(checkpoint.gc, GcReport::default());
    }
}
