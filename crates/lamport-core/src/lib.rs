//! Lamport Core
//!
//! Core types, errors, and constants for the Lamport actor hypervisor.
//!
//! # Overview
//!
//! Lamport runs isolated actors that talk only through capability-addressed
//! messages and advance per-actor logical clocks ("ticks"). Delivery order is
//! a total order over `(fromTicks, fromId)`, so two runs with the same inputs
//! persist byte-identical state.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `PORT_NAME_LENGTH_BYTES_MAX`)
//! - Assertions on preconditions
//! - No recursion (bounded iteration only)

pub mod actor;
pub mod config;
pub mod constants;
pub mod error;
pub mod telemetry;

pub use actor::{ActorId, ContainerType, Tag};
pub use config::{HypervisorConfig, LamportConfig, StorageConfig};
pub use constants::*;
pub use error::{Error, Result};
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
