//! Simulation harness for deterministic testing
//!
//! TigerStyle: Reproducible test execution with explicit configuration.
//!
//! A simulation runs one test body on a fresh current-thread tokio runtime.
//! Everything random (fault decisions, scheduling jitter) is drawn from
//! streams forked off a single seed, so `DST_SEED=<seed>` replays a failure.

use crate::fault::{FaultConfig, FaultInjector, FaultInjectorBuilder};
use crate::rng::{seed_from_env_or_random, DeterministicRng};
use crate::storage::SimStore;
use lamport_core::{init_telemetry, LamportConfig, TelemetryConfig, DST_YIELDS_COUNT_MAX};
use lamport_runtime::Hypervisor;
use std::future::Future;
use std::sync::{Arc, Once};
use thiserror::Error;

/// Default jitter: enough to reorder tasks, small enough to stay fast
pub const SIM_YIELDS_COUNT_DEFAULT: u64 = 8;

/// Install a subscriber once per process when `RUST_LOG` is set
fn init_sim_telemetry() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        if std::env::var_os("RUST_LOG").is_none() {
            return;
        }
        // The test binary may have installed its own subscriber
        if let Err(e) = init_telemetry(TelemetryConfig::from_env()) {
            eprintln!("lamport-dst: {}", e);
        }
    });
}

/// Configuration for a simulation
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Random seed for reproducibility
    pub seed: u64,
    /// Upper bound on scheduler yields injected per storage operation
    pub yields_max: u64,
    /// Configuration for hypervisors built by the environment
    pub lamport: LamportConfig,
}

impl SimConfig {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            yields_max: SIM_YIELDS_COUNT_DEFAULT,
            lamport: LamportConfig::default(),
        }
    }

    /// Seed from `DST_SEED`, or random (always logged)
    pub fn from_env_or_random() -> Self {
        Self::new(seed_from_env_or_random())
    }

    pub fn with_yields_max(mut self, yields_max: u64) -> Self {
        debug_assert!(yields_max <= DST_YIELDS_COUNT_MAX);
        self.yields_max = yields_max;
        self
    }

    pub fn with_lamport_config(mut self, lamport: LamportConfig) -> Self {
        self.lamport = lamport;
        self
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Environment handed to a simulation body
pub struct SimEnvironment {
    pub rng: Arc<DeterministicRng>,
    pub faults: Arc<FaultInjector>,
    pub store: Arc<SimStore>,
    config: LamportConfig,
}

impl SimEnvironment {
    fn build(config: &SimConfig, fault_configs: Vec<FaultConfig>) -> Self {
        let rng = Arc::new(DeterministicRng::new(config.seed));

        let mut builder = FaultInjectorBuilder::new(rng.fork());
        for fault in fault_configs {
            builder = builder.with_fault(fault);
        }
        let faults = Arc::new(builder.build());

        let store = SimStore::new(rng.fork(), faults.clone()).with_yield_jitter(config.yields_max);

        Self {
            rng,
            faults,
            store: Arc::new(store),
            config: config.lamport.clone(),
        }
    }

    /// Independent random stream for the test body
    pub fn fork_rng(&self) -> DeterministicRng {
        self.rng.fork()
    }

    /// A hypervisor over the simulated store
    ///
    /// Calling this again models a restart: the new hypervisor shares the
    /// store but none of the resident actors.
    pub fn hypervisor(&self) -> lamport_core::Result<Hypervisor> {
        Hypervisor::builder()
            .with_store(self.store.clone())
            .with_config(self.config.clone())
            .build()
    }
}

/// Main simulation harness
pub struct Simulation {
    config: SimConfig,
    fault_configs: Vec<FaultConfig>,
}

impl Simulation {
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            fault_configs: Vec::new(),
        }
    }

    pub fn with_fault(mut self, fault: FaultConfig) -> Self {
        self.fault_configs.push(fault);
        self
    }

    pub fn with_faults(mut self, faults: Vec<FaultConfig>) -> Self {
        self.fault_configs.extend(faults);
        self
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    /// Run `test` on a fresh current-thread runtime
    pub fn run<F, Fut, T>(self, test: F) -> Result<T, SimulationError>
    where
        F: FnOnce(SimEnvironment) -> Fut,
        Fut: Future<Output = lamport_core::Result<T>>,
    {
        init_sim_telemetry();
        let seed = self.config.seed;
        let env = SimEnvironment::build(&self.config, self.fault_configs);

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| SimulationError::Runtime(e.to_string()))?;

        tracing::debug!(seed, "Simulation started");
        runtime.block_on(async {
            test(env)
                .await
                .map_err(|source| SimulationError::TestFailed { seed, source })
        })
    }

    /// Run `test` on the caller's runtime
    pub async fn run_async<F, Fut, T>(self, test: F) -> Result<T, SimulationError>
    where
        F: FnOnce(SimEnvironment) -> Fut,
        Fut: Future<Output = lamport_core::Result<T>>,
    {
        init_sim_telemetry();
        let seed = self.config.seed;
        let env = SimEnvironment::build(&self.config, self.fault_configs);
        test(env)
            .await
            .map_err(|source| SimulationError::TestFailed { seed, source })
    }
}

/// Errors that can occur during simulation
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Test failed (seed {seed}): {source}")]
    TestFailed {
        seed: u64,
        source: lamport_core::Error,
    },

    #[error("Runtime error: {0}")]
    Runtime(String),
}
