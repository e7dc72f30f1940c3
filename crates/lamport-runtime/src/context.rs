//! Actor context handed to container hooks
//!
//! TigerStyle: Every capability use is checked against the table.
//!
//! The context is the container's only window onto the hypervisor. A
//! capability may be used as a destination if it is held for the current
//! message, bound to a port, or minted by this actor. Capabilities transferred
//! in an outgoing message must be held or self-minted and must not be bound;
//! transferring one moves it out of the table.

use crate::actor::{derive_actor_id, Actor, ActorRecord, ActorState};
use crate::capability::{CapTable, Capability};
use crate::hypervisor::Hypervisor;
use crate::message::Message;
use crate::ports::Ports;
use bytes::Bytes;
use lamport_core::{ActorId, ContainerType, Error, Result, Tag, MESSAGE_CAPS_COUNT_MAX};
use std::sync::Arc;
use tracing::{debug, warn};

/// Handle through which a container acts on behalf of its actor
pub struct ActorContext {
    actor: Arc<Actor>,
    hypervisor: Hypervisor,
    state: ActorState,
    caps: CapTable,
}

impl ActorContext {
    pub(crate) fn new(actor: Arc<Actor>, hypervisor: Hypervisor, state: ActorState) -> Self {
        Self {
            actor,
            hypervisor,
            state,
            caps: CapTable::new(),
        }
    }

    pub(crate) fn actor(&self) -> &Arc<Actor> {
        &self.actor
    }

    /// This actor's id
    pub fn id(&self) -> ActorId {
        self.actor.id()
    }

    /// This actor's logical clock
    pub fn ticks(&self) -> u64 {
        self.actor.ticks()
    }

    /// Advance the clock by `count` and tell the scheduler
    pub fn increment_ticks(&mut self, count: u64) {
        let ticks = self.actor.add_ticks(count);
        self.actor.scheduler().update(&self.actor);
        debug_assert!(self.actor.ticks() >= ticks);
    }

    /// Mint a capability addressed to this actor
    pub fn mint_cap(&self, tag: Tag) -> Capability {
        Capability::new(self.id(), tag)
    }

    /// Container type this actor runs
    pub fn container_type(&self) -> ContainerType {
        self.state.container_type
    }

    /// Number of children created so far
    pub fn nonce(&self) -> u64 {
        self.state.nonce
    }

    /// Persisted application data
    pub fn data(&self) -> &serde_json::Value {
        &self.state.data
    }

    /// Mutable persisted application data
    pub fn data_mut(&mut self) -> &mut serde_json::Value {
        &mut self.state.data
    }

    /// Code the actor was created with, if any
    pub fn code(&self) -> Option<&Bytes> {
        self.state.code.as_ref()
    }

    /// Capabilities held for the current message
    pub fn caps(&self) -> &CapTable {
        &self.caps
    }

    pub(crate) fn caps_mut(&mut self) -> &mut CapTable {
        &mut self.caps
    }

    /// Whether `cap` is held for the current message
    pub fn holds(&self, cap: &Capability) -> bool {
        self.caps.contains(cap)
    }

    fn is_self_minted(&self, cap: &Capability) -> bool {
        cap.dest_id() == self.id()
    }

    fn can_address(&self, cap: &Capability) -> bool {
        self.is_self_minted(cap) || self.caps.contains(cap) || self.state.ports.is_bound(cap)
    }

    fn not_held(&self, cap: &Capability) -> Error {
        Error::CapabilityNotHeld {
            actor_id: self.id().to_hex(),
            dest_id: cap.dest_id().to_hex(),
            tag: cap.tag(),
        }
    }

    /// Validate the capabilities an outgoing message carries and release them
    fn take_transferred(&mut self, message: &Message) -> Result<()> {
        if message.caps().len() > MESSAGE_CAPS_COUNT_MAX {
            return Err(Error::TooManyCapabilities {
                count: message.caps().len(),
                limit: MESSAGE_CAPS_COUNT_MAX,
            });
        }
        for cap in message.caps() {
            if self.state.ports.is_bound(cap) {
                return Err(Error::MessageContainsBoundCapability {
                    dest_id: cap.dest_id().to_hex(),
                    tag: cap.tag(),
                });
            }
            if !self.is_self_minted(cap) && !self.caps.contains(cap) {
                return Err(self.not_held(cap));
            }
        }
        if let Some(cap) = message.response_cap() {
            if !self.can_address(cap) {
                return Err(self.not_held(cap));
            }
        }

        for cap in message.caps() {
            self.caps.take(cap);
        }
        Ok(())
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Send a message through `cap`
    pub async fn send(&mut self, cap: Capability, mut message: Message) -> Result<()> {
        if !self.can_address(&cap) {
            return Err(self.not_held(&cap));
        }
        self.take_transferred(&message)?;

        message.stamp(self.ticks(), Some(self.id()), Some(cap.tag()));
        self.hypervisor.route(cap.dest_id(), message).await
    }

    /// Send a reply through a response capability, logging failures
    pub(crate) async fn reply(&self, cap: Capability, data: Bytes) {
        let mut message = Message::new(data);
        message.stamp(self.ticks(), Some(self.id()), Some(cap.tag()));
        if let Err(e) = self.hypervisor.route(cap.dest_id(), message).await {
            warn!(
                actor_id = %self.id().short(),
                dest_id = %cap.dest_id().short(),
                error = %e,
                "Reply undeliverable"
            );
        }
    }

    /// Create a child actor; its capability is held for the current message
    pub async fn create_actor(&mut self, container_type: ContainerType, message: Message) -> Result<Capability> {
        self.create_child(container_type, None, message).await
    }

    /// Create a child actor that carries a code blob
    pub async fn create_actor_with_code(
        &mut self,
        container_type: ContainerType,
        code: Bytes,
        message: Message,
    ) -> Result<Capability> {
        self.create_child(container_type, Some(code), message).await
    }

    async fn create_child(
        &mut self,
        container_type: ContainerType,
        code: Option<Bytes>,
        mut message: Message,
    ) -> Result<Capability> {
        self.hypervisor.ensure_registered(container_type)?;
        self.take_transferred(&message)?;

        let nonce = self.state.nonce;
        let id = derive_actor_id(nonce, Some(&self.id()));
        let ticks = self.ticks();
        message.stamp(ticks, Some(self.id()), None);

        self.hypervisor
            .spawn(id, container_type, code, message, ticks)
            .await?;
        self.state.nonce += 1;

        let cap = Capability::new(id, 0);
        self.caps.insert(cap);
        debug!(
            actor_id = %self.id().short(),
            child_id = %id.short(),
            nonce,
            "Created child actor"
        );
        Ok(cap)
    }

    /// Wait for the next message tagged with one of `tags`
    ///
    /// Returns `None` if nothing arrives before this actor's clock passes
    /// `ticks + timeout`. Capabilities on the received message are held for
    /// the rest of the current message.
    pub async fn wait_on_tag(&mut self, tags: &[Tag], timeout: u64) -> Result<Option<Message>> {
        let received = self
            .actor
            .inbox()
            .wait_on_tag(tags, self.ticks(), timeout)
            .await?;

        if let Some(message) = &received {
            if message.from_ticks() > self.ticks() {
                self.actor.advance_ticks_to(message.from_ticks());
                self.actor.scheduler().update(&self.actor);
            }
            for cap in message.caps() {
                self.caps.insert(*cap);
            }
            if let Some(cap) = message.response_cap() {
                self.caps.insert(*cap);
            }
        }
        Ok(received)
    }

    // =========================================================================
    // Ports
    // =========================================================================

    /// Persist `cap` under `name`
    pub fn bind(&mut self, name: &str, cap: Capability) -> Result<()> {
        if !self.is_self_minted(&cap) && !self.caps.contains(&cap) && !self.state.ports.is_bound(&cap) {
            return Err(self.not_held(&cap));
        }
        self.state.ports.bind(name, cap)
    }

    /// Remove the binding for `name`
    ///
    /// The capability stays held for the rest of the current message; its
    /// destination becomes a collection candidate at the next checkpoint.
    pub fn unbind(&mut self, name: &str) -> Result<Capability> {
        let cap = self.state.ports.unbind(name)?;
        self.caps.insert(cap);
        self.hypervisor.flag_collection_candidate(cap.dest_id());
        Ok(cap)
    }

    /// Capability bound under `name`
    pub fn port(&self, name: &str) -> Option<Capability> {
        self.state.ports.get(name)
    }

    /// Whether `cap` is bound to a port
    pub fn is_bound(&self, cap: &Capability) -> bool {
        self.state.ports.is_bound(cap)
    }

    /// All port bindings
    pub fn ports(&self) -> &Ports {
        &self.state.ports
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub(crate) async fn persist(&self) -> Result<()> {
        let record = ActorRecord::from_state(&self.state, self.ticks());
        let bytes = record.encode()?;
        self.hypervisor.store().set(&self.id(), bytes).await
    }
}
