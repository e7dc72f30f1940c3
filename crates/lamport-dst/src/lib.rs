//! Lamport DST - Deterministic Simulation Testing
//!
//! Seeded fault injection and scheduling jitter for the Lamport hypervisor.
//!
//! # Overview
//!
//! A simulation provides:
//! - Reproducible random streams (`DeterministicRng`)
//! - Storage fault injection (`FaultInjector`)
//! - A fault-injecting store that also perturbs task interleaving (`SimStore`)
//! - A harness that builds hypervisors over that store (`Simulation`)
//!
//! # Example
//!
//! ```rust,ignore
//! use lamport_dst::{FaultConfig, FaultType, SimConfig, Simulation};
//!
//! #[test]
//! fn test_with_faults() {
//!     let config = SimConfig::from_env_or_random();
//!     let result = Simulation::new(config)
//!         .with_fault(FaultConfig::new(FaultType::StorageWriteFail, 0.1))
//!         .run(|env| async move {
//!             let hypervisor = env.hypervisor()?;
//!             // create actors, send messages, checkpoint
//!             Ok(())
//!         });
//!     assert!(result.is_ok());
//! }
//! ```
//!
//! # TigerStyle
//!
//! - All decisions are drawn from the seed
//! - The seed is always logged
//! - Explicit fault types and probabilities

pub mod fault;
pub mod rng;
pub mod simulation;
pub mod storage;

pub use fault::{FaultConfig, FaultInjector, FaultInjectorBuilder, FaultStats, FaultType};
pub use rng::{seed_from_env_or_random, DeterministicRng};
pub use simulation::{SimConfig, SimEnvironment, Simulation, SimulationError, SIM_YIELDS_COUNT_DEFAULT};
pub use storage::SimStore;
