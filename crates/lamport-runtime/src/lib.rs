//! Lamport Runtime
//!
//! Deterministic scheduler, causal inbox, and actor kernel for the Lamport
//! hypervisor.
//!
//! # Overview
//!
//! The runtime provides:
//! - A global tick-aware scheduler that proves causal safety before delivery
//! - Per-actor inboxes ordered by `(from_ticks, from_id)`
//! - Single-threaded message dispatch per actor
//! - Capability-checked sends, port bindings, and tagged waits
//! - Lazy loading from storage and unloading when idle
//! - Checkpoints with reachability garbage collection
//!
//! # TigerStyle
//! - Explicit lifecycle states
//! - No lock held across an await point
//! - Bounded retries, bounded traversal

pub mod actor;
pub mod capability;
pub mod container;
pub mod context;
pub mod gc;
pub mod hypervisor;
pub mod inbox;
pub mod message;
pub mod ports;
pub mod scheduler;

pub use actor::{derive_actor_id, Actor, RunState};
pub use capability::{CapTable, Capability};
pub use container::{CloneFactory, Container, ContainerFactory};
pub use context::ActorContext;
pub use gc::GcReport;
pub use hypervisor::{Checkpoint, Hypervisor, HypervisorBuilder};
pub use inbox::Inbox;
pub use message::{exception_reply, is_exception_reply, Message};
pub use ports::Ports;
pub use scheduler::{Instance, LoadLock, Scheduler};
