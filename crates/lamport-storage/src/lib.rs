//! Lamport Storage
//!
//! Content-addressed state storage for the Lamport actor hypervisor.
//!
//! # Overview
//!
//! Actor records are stored by actor id, code fragments by content hash, and
//! `flush` seals both into a single merkle root. Two runs that perform the
//! same writes produce the same root, which is how checkpoint determinism is
//! observed.
//!
//! Backends:
//! - In-memory (`MemoryStore`) for embedding, tests, and DST

pub mod chunk;
pub mod hash;
pub mod memory;
pub mod store;

pub use chunk::{load_code, split, store_code, CodeLink};
pub use hash::{merkle_link, merkle_link_parts, merkle_root, ContentHash, CONTENT_HASH_LENGTH_BYTES};
pub use memory::MemoryStore;
pub use store::StateStore;
