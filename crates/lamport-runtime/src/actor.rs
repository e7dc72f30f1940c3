//! Actor kernel and run loop
//!
//! TigerStyle: Explicit lifecycle states, one run loop per residency.
//!
//! An `Actor` is the resident handle: id, logical clock, inbox and lifecycle
//! state. The run loop (`ActorTask`) owns the container and the actor's
//! mutable state, dispatches one message at a time, and persists the actor
//! record after every message.
//!
//! State transitions:
//! ```text
//!   Idle --start--> Running --inbox drained--> Unloaded
//! ```
//! An unloaded handle rejects new messages so the router reloads the actor
//! from storage instead.

use crate::capability::CapabilityRecord;
use crate::container::Container;
use crate::context::ActorContext;
use crate::inbox::Inbox;
use crate::message::{exception_reply, Message};
use crate::ports::Ports;
use crate::scheduler::Scheduler;
use bytes::Bytes;
use lamport_core::{ActorId, ContainerType, Error, Result};
use lamport_storage::{merkle_link_parts, CodeLink};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, instrument, warn};

/// Derive an actor id from its creation nonce and parent
///
/// Top-level actors have no parent. The same creation history always yields
/// the same id.
pub fn derive_actor_id(nonce: u64, parent: Option<&ActorId>) -> ActorId {
    let nonce_bytes = nonce.to_be_bytes();
    let link = match parent {
        Some(parent) => merkle_link_parts(&[&nonce_bytes, parent.as_bytes()]),
        None => merkle_link_parts(&[&nonce_bytes]),
    };
    link.to_actor_id()
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Actor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    /// Constructed but not started
    #[default]
    Idle,
    /// Run loop active; accepts messages
    Running,
    /// Run loop retired; rejects messages
    Unloaded,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Running => write!(f, "running"),
            RunState::Unloaded => write!(f, "unloaded"),
        }
    }
}

/// Resident handle of an actor
pub struct Actor {
    id: ActorId,
    ticks: AtomicU64,
    inbox: Inbox,
    run_state: Mutex<RunState>,
    scheduler: Scheduler,
}

impl std::fmt::Debug for Actor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("ticks", &self.ticks())
            .field("run_state", &self.run_state())
            .finish()
    }
}

impl Actor {
    /// Create a handle that is not yet registered with the scheduler
    pub(crate) fn detached(id: ActorId, ticks: u64, scheduler: Scheduler) -> Arc<Self> {
        Arc::new(Self {
            id,
            ticks: AtomicU64::new(ticks),
            inbox: Inbox::new(id, scheduler.clone()),
            run_state: Mutex::new(RunState::Idle),
            scheduler,
        })
    }

    fn lifecycle(&self) -> MutexGuard<'_, RunState> {
        self.run_state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Actor id
    pub fn id(&self) -> ActorId {
        self.id
    }

    /// Current logical clock
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Raise the clock to at least `ticks`
    pub(crate) fn advance_ticks_to(&self, ticks: u64) {
        self.ticks.fetch_max(ticks, Ordering::SeqCst);
    }

    /// Add `count` to the clock, returning the new value
    pub(crate) fn add_ticks(&self, count: u64) -> u64 {
        let before = self.ticks.fetch_add(count, Ordering::SeqCst);
        debug_assert!(before.checked_add(count).is_some(), "tick overflow");
        before.saturating_add(count)
    }

    /// The actor's inbox
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Lifecycle state
    pub fn run_state(&self) -> RunState {
        *self.lifecycle()
    }

    /// Register with the scheduler and spawn the run loop
    pub(crate) fn start(self: &Arc<Self>, task: ActorTask, first: Option<Message>) {
        {
            let mut run_state = self.lifecycle();
            assert_eq!(*run_state, RunState::Idle, "actor started twice");
            if let Some(message) = first {
                self.inbox.queue(message);
            }
            *run_state = RunState::Running;
            self.scheduler.update(self);
        }

        let run = tokio::spawn(task.run());
        let actor = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = run.await {
                actor.abandon(&e.to_string());
            }
        });
    }

    /// Hand a message to a running actor
    ///
    /// Returns the message back if the handle has unloaded.
    pub(crate) fn queue(&self, message: Message) -> std::result::Result<(), Message> {
        let run_state = self.lifecycle();
        match *run_state {
            RunState::Running => {
                self.inbox.queue(message);
                Ok(())
            }
            RunState::Idle | RunState::Unloaded => Err(message),
        }
    }

    /// Unload if nothing arrived since the inbox drained
    fn try_unload(&self) -> bool {
        let mut run_state = self.lifecycle();
        if !self.inbox.is_empty() {
            return false;
        }
        *run_state = RunState::Unloaded;
        self.shutdown();
        true
    }

    /// Retire a residency whose run loop died before unloading
    ///
    /// Queued messages are dropped; the last persisted record stays the
    /// actor's state for its next load.
    fn abandon(&self, reason: &str) {
        let dropped = {
            let mut run_state = self.lifecycle();
            *run_state = RunState::Unloaded;
            let dropped = self.inbox.drain();
            self.shutdown();
            dropped
        };
        error!(
            actor_id = %self.id.short(),
            reason,
            dropped = dropped.len(),
            "Actor run loop aborted"
        );
    }

    /// Remove this actor from the scheduler
    pub(crate) fn shutdown(&self) {
        self.scheduler.done(&self.id);
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }
}

// =============================================================================
// Actor state and persisted record
// =============================================================================

/// Mutable state owned by the run loop
#[derive(Debug)]
pub(crate) struct ActorState {
    pub container_type: ContainerType,
    pub nonce: u64,
    pub ports: Ports,
    pub data: serde_json::Value,
    pub code: Option<Bytes>,
    pub code_link: Option<CodeLink>,
}

impl ActorState {
    pub fn new(container_type: ContainerType, code: Option<Bytes>, code_link: Option<CodeLink>) -> Self {
        debug_assert_eq!(code.is_some(), code_link.is_some());
        Self {
            container_type,
            nonce: 0,
            ports: Ports::new(),
            data: serde_json::Value::Null,
            code,
            code_link,
        }
    }
}

/// Actor record as stored in the state store
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ActorRecord {
    pub container_type: ContainerType,
    pub nonce: u64,
    pub ticks: u64,
    #[serde(default)]
    pub ports: BTreeMap<String, CapabilityRecord>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<CodeLink>,
}

impl ActorRecord {
    pub fn from_state(state: &ActorState, ticks: u64) -> Self {
        Self {
            container_type: state.container_type,
            nonce: state.nonce,
            ticks,
            ports: state.ports.to_records(),
            data: state.data.clone(),
            code: state.code_link.clone(),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| Error::SerializationFailed {
                reason: format!("actor record: {}", e),
            })
    }

    pub fn decode(id: &ActorId, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::DeserializationFailed {
            reason: format!("actor record {}: {}", id, e),
        })
    }

    /// Destinations of every bound port
    pub fn port_destinations(&self) -> impl Iterator<Item = ActorId> + '_ {
        self.ports.values().map(|record| record.dest_id)
    }

    pub fn into_state(self, code: Option<Bytes>) -> ActorState {
        ActorState {
            container_type: self.container_type,
            nonce: self.nonce,
            ports: Ports::from_records(self.ports),
            data: self.data,
            code,
            code_link: self.code,
        }
    }
}

// =============================================================================
// Run loop
// =============================================================================

#[derive(Debug, Clone, Copy)]
enum Hook {
    Creation,
    Message,
}

/// The run loop of one actor residency
pub(crate) struct ActorTask {
    container: Box<dyn Container>,
    ctx: ActorContext,
    creation: Option<Message>,
}

impl ActorTask {
    pub fn new(container: Box<dyn Container>, ctx: ActorContext, creation: Option<Message>) -> Self {
        Self {
            container,
            ctx,
            creation,
        }
    }

    #[instrument(skip_all, fields(actor_id = %self.ctx.id().short()), level = "debug")]
    async fn run(mut self) {
        let actor = Arc::clone(self.ctx.actor());

        if let Some(creation) = self.creation.take() {
            if let Err(e) = self.dispatch(creation, Hook::Creation).await {
                self.roll_back(e).await;
                return;
            }
            persist(&self.ctx).await;
        }

        loop {
            while let Some(message) = actor.inbox().next_message(actor.ticks()).await {
                if message.from_ticks() > actor.ticks() {
                    actor.advance_ticks_to(message.from_ticks());
                    actor.scheduler().update(&actor);
                }
                // Failures were already answered through the response capability
                let _ = self.dispatch(message, Hook::Message).await;
                persist(&self.ctx).await;
            }

            if let Err(e) = self.container.on_idle(&mut self.ctx).await {
                warn!(actor_id = %actor.id().short(), error = %e, "on_idle failed");
            }
            persist(&self.ctx).await;

            if actor.try_unload() {
                break;
            }
        }

        debug!(actor_id = %actor.id().short(), ticks = actor.ticks(), "Actor unloaded");
    }

    async fn dispatch(&mut self, mut message: Message, hook: Hook) -> Result<()> {
        let response_cap = message.take_response_cap();
        for cap in message.caps() {
            self.ctx.caps_mut().insert(*cap);
        }
        debug!(
            actor_id = %self.ctx.id().short(),
            ticks = self.ctx.ticks(),
            tag = ?message.tag(),
            hook = ?hook,
            "Dispatching message"
        );

        let result = match hook {
            Hook::Creation => self.container.on_creation(&mut self.ctx, message).await,
            Hook::Message => self.container.on_message(&mut self.ctx, message).await,
        };

        let reply = match &result {
            Ok(data) => data.clone(),
            Err(e) => {
                warn!(actor_id = %self.ctx.id().short(), error = %e, "Container fault");
                exception_reply(&e.to_string())
            }
        };
        if let Some(cap) = response_cap {
            self.ctx.reply(cap, reply).await;
        }

        self.ctx.caps_mut().clear();
        debug_assert!(self.ctx.caps().is_empty());
        result.map(|_| ())
    }

    /// Discard an actor whose creation failed
    async fn roll_back(self, error: Error) {
        let actor = Arc::clone(self.ctx.actor());
        let pending = {
            let mut run_state = actor.lifecycle();
            *run_state = RunState::Unloaded;
            let pending = actor.inbox().drain();
            actor.shutdown();
            pending
        };

        info!(
            actor_id = %actor.id().short(),
            error = %error,
            pending = pending.len(),
            "Actor creation rolled back"
        );

        let failure = Error::ActorCreationFailed {
            id: actor.id().to_hex(),
            reason: error.to_string(),
        };
        let reply = exception_reply(&failure.to_string());
        for mut message in pending {
            if let Some(cap) = message.take_response_cap() {
                self.ctx.reply(cap, reply.clone()).await;
            }
        }
    }
}

/// Write the actor record, logging failures
async fn persist(ctx: &ActorContext) {
    if let Err(e) = ctx.persist().await {
        error!(actor_id = %ctx.id().short(), error = %e, "Failed to persist actor");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_loop_is_spawnable() {
        fn require_send<T: Send>(_: &T) {}
        // Type-checked only: the run loop must be a `Send` future
        let _ = |task: ActorTask| {
            let run = task.run();
            require_send(&run);
        };
    }

    #[test]
    fn test_derive_actor_id_is_stable() {
        let root = derive_actor_id(0, None);
        assert_eq!(root, derive_actor_id(0, None));
        assert_ne!(root, derive_actor_id(1, None));

        let child = derive_actor_id(0, Some(&root));
        assert_ne!(child, root);
        assert_eq!(child, derive_actor_id(0, Some(&root)));
        assert_ne!(child, derive_actor_id(0, Some(&derive_actor_id(1, None))));
    }

    #[test]
    fn test_ticks_only_move_forward() {
        let actor = Actor::detached(ActorId::from_bytes([1; 32]), 5, Scheduler::new());
        actor.advance_ticks_to(3);
        assert_eq!(actor.ticks(), 5);
        actor.advance_ticks_to(9);
        assert_eq!(actor.ticks(), 9);
        assert_eq!(actor.add_ticks(2), 11);
    }

    #[test]
    fn test_detached_actor_rejects_messages() {
        let actor = Actor::detached(ActorId::from_bytes([1; 32]), 0, Scheduler::new());
        assert_eq!(actor.run_state(), RunState::Idle);
        assert!(actor.queue(Message::new("x")).is_err());
        assert!(actor.inbox().is_empty());
    }

    #[test]
    fn test_record_encoding() {
        let mut state = ActorState::new(ContainerType::new(3), None, None);
        state.nonce = 2;
        state.data = serde_json::json!({"count": 1});

        let record = ActorRecord::from_state(&state, 7);
        let id = ActorId::from_bytes([1; 32]);
        let decoded = ActorRecord::decode(&id, &record.encode().unwrap()).unwrap();
        assert_eq!(decoded.ticks, 7);
        assert_eq!(decoded.nonce, 2);
        assert_eq!(decoded.container_type, ContainerType::new(3));
        assert_eq!(decoded.data["count"], 1);
        assert!(decoded.code.is_none());

        assert!(ActorRecord::decode(&id, b"not json").is_err());
    }
}
