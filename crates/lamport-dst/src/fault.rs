//! Fault injection for deterministic testing
//!
//! TigerStyle: Explicit fault types, probabilistic injection, bounded triggers.

use crate::rng::DeterministicRng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Faults the simulated store can inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    /// An actor record write fails
    StorageWriteFail,
    /// An actor record read fails
    StorageReadFail,
    /// An actor record read returns garbage
    StorageCorruption,
    /// A code chunk read comes back missing
    ChunkLoss,
    /// Computing the state root fails
    FlushFail,
}

impl FaultType {
    pub fn name(&self) -> &'static str {
        match self {
            FaultType::StorageWriteFail => "storage_write_fail",
            FaultType::StorageReadFail => "storage_read_fail",
            FaultType::StorageCorruption => "storage_corruption",
            FaultType::ChunkLoss => "chunk_loss",
            FaultType::FlushFail => "flush_fail",
        }
    }
}

/// One fault injection rule
#[derive(Debug, Clone)]
pub struct FaultConfig {
    pub fault_type: FaultType,
    /// Probability of injection (0.0 - 1.0)
    pub probability: f64,
    /// Only operations whose name contains this string are affected
    pub operation_filter: Option<String>,
    /// Only trigger after this many operations
    pub after_operations: u64,
    pub max_triggers: Option<u64>,
}

impl FaultConfig {
    pub fn new(fault_type: FaultType, probability: f64) -> Self {
        debug_assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1]"
        );

        Self {
            fault_type,
            probability,
            operation_filter: None,
            after_operations: 0,
            max_triggers: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.operation_filter = Some(filter.into());
        self
    }

    pub fn after(mut self, operations: u64) -> Self {
        self.after_operations = operations;
        self
    }

    pub fn max_triggers(mut self, max: u64) -> Self {
        self.max_triggers = Some(max);
        self
    }
}

#[derive(Debug)]
struct FaultState {
    config: FaultConfig,
    trigger_count: AtomicU64,
}

/// Decides, per operation, whether a registered fault fires
#[derive(Debug)]
pub struct FaultInjector {
    faults: Vec<FaultState>,
    rng: DeterministicRng,
    operation_count: AtomicU64,
}

impl FaultInjector {
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            faults: Vec::new(),
            rng,
            operation_count: AtomicU64::new(0),
        }
    }

    pub fn register(&mut self, config: FaultConfig) {
        self.faults.push(FaultState {
            config,
            trigger_count: AtomicU64::new(0),
        });
    }

    /// Fault to inject for `operation`, if any
    ///
    /// Only faults listed in `applicable` are considered; the first one
    /// that fires wins.
    pub fn should_inject(&self, operation: &str, applicable: &[FaultType]) -> Option<FaultType> {
        let op_count = self.operation_count.fetch_add(1, Ordering::SeqCst);

        for state in &self.faults {
            let config = &state.config;
            if !applicable.contains(&config.fault_type) {
                continue;
            }
            if let Some(filter) = &config.operation_filter {
                if !operation.contains(filter.as_str()) {
                    continue;
                }
            }
            if op_count < config.after_operations {
                continue;
            }
            let trigger_count = state.trigger_count.load(Ordering::SeqCst);
            if config.max_triggers.is_some_and(|max| trigger_count >= max) {
                continue;
            }

            if self.rng.next_bool(config.probability) {
                state.trigger_count.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(
                    fault = config.fault_type.name(),
                    operation,
                    trigger_count = trigger_count + 1,
                    "Injecting fault"
                );
                return Some(config.fault_type);
            }
        }

        None
    }

    pub fn operation_count(&self) -> u64 {
        self.operation_count.load(Ordering::SeqCst)
    }

    /// Total triggers across all rules
    pub fn trigger_count(&self) -> u64 {
        self.faults
            .iter()
            .map(|state| state.trigger_count.load(Ordering::SeqCst))
            .sum()
    }

    pub fn stats(&self) -> Vec<FaultStats> {
        self.faults
            .iter()
            .map(|state| FaultStats {
                fault_type: state.config.fault_type.name(),
                probability: state.config.probability,
                trigger_count: state.trigger_count.load(Ordering::SeqCst),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct FaultStats {
    pub fault_type: &'static str,
    pub probability: f64,
    pub trigger_count: u64,
}

/// Builder for a [`FaultInjector`]
pub struct FaultInjectorBuilder {
    rng: DeterministicRng,
    faults: Vec<FaultConfig>,
}

impl FaultInjectorBuilder {
    pub fn new(rng: DeterministicRng) -> Self {
        Self {
            rng,
            faults: Vec::new(),
        }
    }

    pub fn with_fault(mut self, config: FaultConfig) -> Self {
        self.faults.push(config);
        self
    }

    /// Read and write failures at the same probability
    pub fn with_storage_faults(self, probability: f64) -> Self {
        self.with_fault(FaultConfig::new(FaultType::StorageWriteFail, probability))
            .with_fault(FaultConfig::new(FaultType::StorageReadFail, probability))
    }

    pub fn build(self) -> FaultInjector {
        let mut injector = FaultInjector::new(self.rng);
        for config in self.faults {
            injector.register(config);
        }
        injector
    }
}
