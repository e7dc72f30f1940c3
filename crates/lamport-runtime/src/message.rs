//! Messages and the arbiter order
//!
//! TigerStyle: One total order, stamped once.
//!
//! Every message carries the sender's tick count and id at the moment it was
//! sent. Inboxes deliver in ascending `(from_ticks, from_id)`, with messages
//! from outside the hypervisor (`from_id == None`) ordered before any actor
//! at the same tick count.

use crate::capability::Capability;
use bytes::Bytes;
use lamport_core::{ActorId, Tag};
use serde::Serialize;
use std::cmp::Ordering;

/// A message delivered to an actor
#[derive(Debug, Clone)]
pub struct Message {
    data: Bytes,
    caps: Vec<Capability>,
    response_cap: Option<Capability>,
    tag: Option<Tag>,
    from_id: Option<ActorId>,
    from_ticks: u64,
    stamped: bool,
}

impl Message {
    /// Create an unstamped message carrying `data`
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            caps: Vec::new(),
            response_cap: None,
            tag: None,
            from_id: None,
            from_ticks: 0,
            stamped: false,
        }
    }

    /// Attach capabilities to transfer with this message
    pub fn with_caps(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.caps.extend(caps);
        self
    }

    /// Ask the receiver to reply through `cap` once it has processed this message
    pub fn with_response_cap(mut self, cap: Capability) -> Self {
        self.response_cap = Some(cap);
        self
    }

    /// Payload bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Capabilities transferred with this message
    pub fn caps(&self) -> &[Capability] {
        &self.caps
    }

    /// Capability the reply is sent through, if any
    pub fn response_cap(&self) -> Option<&Capability> {
        self.response_cap.as_ref()
    }

    /// Tag of the capability this message was sent through
    pub fn tag(&self) -> Option<Tag> {
        self.tag
    }

    /// Sending actor, or `None` when the message came from outside
    pub fn from_id(&self) -> Option<ActorId> {
        self.from_id
    }

    /// Sender's tick count when the message was sent
    pub fn from_ticks(&self) -> u64 {
        self.from_ticks
    }

    /// Record the sender's clock and the capability tag
    ///
    /// Called exactly once, by the send path, before the message enters any
    /// inbox.
    pub(crate) fn stamp(&mut self, from_ticks: u64, from_id: Option<ActorId>, tag: Option<Tag>) {
        debug_assert!(!self.stamped, "message stamped twice");
        self.from_ticks = from_ticks;
        self.from_id = from_id;
        self.tag = tag;
        self.stamped = true;
    }

    pub(crate) fn take_response_cap(&mut self) -> Option<Capability> {
        self.response_cap.take()
    }

    /// Compare two messages in delivery order
    pub fn arbiter_cmp(&self, other: &Message) -> Ordering {
        self.from_ticks
            .cmp(&other.from_ticks)
            .then_with(|| self.from_id.cmp(&other.from_id))
    }
}

// =============================================================================
// Exception replies
// =============================================================================

#[derive(Serialize)]
struct ExceptionReply<'a> {
    exception: bool,
    error: &'a str,
}

/// Payload sent through a response capability when processing failed
pub fn exception_reply(error: &str) -> Bytes {
    let reply = ExceptionReply {
        exception: true,
        error,
    };
    match serde_json::to_vec(&reply) {
        Ok(bytes) => Bytes::from(bytes),
        // A struct of a bool and a str always serializes
        Err(_) => Bytes::from_static(br#"{"exception":true}"#),
    }
}

/// Whether a reply payload is an exception reply
pub fn is_exception_reply(data: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(data)
        .ok()
        .and_then(|v| v.get("exception").and_then(serde_json::Value::as_bool))
        .unwrap_or(false)
}
