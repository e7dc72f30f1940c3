//! Capabilities and the per-message capability table
//!
//! TigerStyle: Construction discipline is the security boundary.
//!
//! A `Capability` can only be produced inside this crate: minted by an actor
//! naming itself, returned by actor creation, or rebuilt from that actor's own
//! persisted port bindings. There is no public constructor and no public
//! `Deserialize`, so containers cannot fabricate one from raw bytes.

use lamport_core::{ActorId, Tag};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Unforgeable reference granting the right to send tagged messages
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct Capability {
    dest_id: ActorId,
    tag: Tag,
}

impl Capability {
    pub(crate) fn new(dest_id: ActorId, tag: Tag) -> Self {
        Self { dest_id, tag }
    }

    /// Actor that receives messages sent through this capability
    pub fn dest_id(&self) -> ActorId {
        self.dest_id
    }

    /// Tag stamped on every message sent through this capability
    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub(crate) fn to_record(self) -> CapabilityRecord {
        CapabilityRecord {
            dest_id: self.dest_id,
            tag: self.tag,
        }
    }
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Capability({}/{})", self.dest_id.short(), self.tag)
    }
}

/// Persisted form of a bound capability
///
/// Only the runtime turns records back into capabilities, and only for the
/// actor whose record holds them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct CapabilityRecord {
    pub dest_id: ActorId,
    pub tag: Tag,
}

impl CapabilityRecord {
    pub fn into_capability(self) -> Capability {
        Capability::new(self.dest_id, self.tag)
    }
}

// =============================================================================
// CapTable
// =============================================================================

/// Capabilities an actor holds for the message it is currently processing
///
/// Filled with the capabilities carried by the message, plus any returned by
/// `create_actor` or `unbind` while it runs. Cleared unconditionally once the
/// message finishes.
#[derive(Debug, Default)]
pub struct CapTable {
    held: BTreeSet<Capability>,
}

impl CapTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a capability for the rest of the current message
    pub fn insert(&mut self, cap: Capability) {
        self.held.insert(cap);
    }

    /// Whether the capability is held
    pub fn contains(&self, cap: &Capability) -> bool {
        self.held.contains(cap)
    }

    /// Remove a capability, returning whether it was held
    pub fn take(&mut self, cap: &Capability) -> bool {
        self.held.remove(cap)
    }

    /// Drop every held capability
    pub fn clear(&mut self) {
        self.held.clear();
        debug_assert!(self.held.is_empty());
    }

    /// Number of held capabilities
    pub fn len(&self) -> usize {
        self.held.len()
    }

    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.held.is_empty()
    }

    /// Iterate held capabilities in order
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.held.iter()
    }
}
