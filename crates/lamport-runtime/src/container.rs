//! Container trait and factories
//!
//! TigerStyle: One message at a time, explicit hooks.
//!
//! A container is the code that runs inside an actor. The kernel calls
//! exactly one hook at a time per actor; hooks receive an [`ActorContext`]
//! through which they send, create, bind and wait.

use crate::context::ActorContext;
use crate::message::Message;
use async_trait::async_trait;
use bytes::Bytes;
use lamport_core::{ActorId, Result};

/// Code executed inside an actor
#[async_trait]
pub trait Container: Send + 'static {
    /// Handle the creation message of a freshly created actor
    ///
    /// An error discards the actor: nothing is persisted.
    async fn on_creation(&mut self, _ctx: &mut ActorContext, _message: Message) -> Result<Bytes> {
        Ok(Bytes::new())
    }

    /// Handle one delivered message
    ///
    /// The returned bytes are sent through the message's response capability,
    /// if it carried one.
    async fn on_message(&mut self, ctx: &mut ActorContext, message: Message) -> Result<Bytes>;

    /// Called after the actor is reloaded from storage, before any delivery
    async fn on_startup(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        Ok(())
    }

    /// Called when the inbox drains, before the actor unloads
    async fn on_idle(&mut self, _ctx: &mut ActorContext) -> Result<()> {
        Ok(())
    }
}

/// Builds container instances for one container type
pub trait ContainerFactory: Send + Sync + 'static {
    /// Create a container for the given actor
    fn create(&self, id: &ActorId) -> Box<dyn Container>;
}

impl<F> ContainerFactory for F
where
    F: Fn(&ActorId) -> Box<dyn Container> + Send + Sync + 'static,
{
    fn create(&self, id: &ActorId) -> Box<dyn Container> {
        self(id)
    }
}

/// Factory that clones a prototype container
pub struct CloneFactory<C: Container + Clone + Sync> {
    prototype: C,
}

impl<C: Container + Clone + Sync> CloneFactory<C> {
    /// Create a new clone factory
    pub fn new(prototype: C) -> Self {
        Self { prototype }
    }
}

impl<C: Container + Clone + Sync> ContainerFactory for CloneFactory<C> {
    fn create(&self, _id: &ActorId) -> Box<dyn Container> {
        Box::new(self.prototype.clone())
    }
}
