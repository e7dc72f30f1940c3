//! Deterministic RNG for simulation
//!
//! TigerStyle: ChaCha20 streams, one seed per run, logged for replay.

use lamport_core::DST_SEED_ENV_VAR;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Multiplier that spreads fork seeds across the u64 space
const FORK_SEED_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

/// Seed from `DST_SEED`, or a fresh random one
///
/// The seed is always logged so a failing run can be replayed.
pub fn seed_from_env_or_random() -> u64 {
    let seed = std::env::var(DST_SEED_ENV_VAR)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(rand::random);

    tracing::info!(seed, "DST seed (set {}={} to replay)", DST_SEED_ENV_VAR, seed);
    seed
}

/// Seeded random stream shared by every component of one simulation
///
/// Cloning shares the stream; [`DeterministicRng::fork`] derives an
/// independent one.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    seed: u64,
    rng: Arc<Mutex<ChaCha20Rng>>,
    forks: Arc<AtomicU64>,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            forks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn from_env_or_random() -> Self {
        Self::new(seed_from_env_or_random())
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn stream(&self) -> MutexGuard<'_, ChaCha20Rng> {
        self.rng.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn next_u64(&self) -> u64 {
        self.stream().gen()
    }

    /// True with the given probability
    pub fn next_bool(&self, probability: f64) -> bool {
        debug_assert!(
            (0.0..=1.0).contains(&probability),
            "probability must be in [0, 1]"
        );
        self.stream().gen::<f64>() < probability
    }

    /// Value in `[min, max)`
    pub fn next_range(&self, min: u64, max: u64) -> u64 {
        debug_assert!(min < max, "min must be less than max");
        self.stream().gen_range(min..max)
    }

    /// Shuffle in place (Fisher-Yates)
    pub fn shuffle<T>(&self, slice: &mut [T]) {
        let mut rng = self.stream();
        for i in (1..slice.len()).rev() {
            let j = rng.gen_range(0..=i);
            slice.swap(i, j);
        }
    }

    /// Fill `dest` with random bytes
    pub fn fill_bytes(&self, dest: &mut [u8]) {
        self.stream().fill(dest);
    }

    /// Independent stream derived from this one's seed and fork count
    pub fn fork(&self) -> Self {
        let fork_id = self.forks.fetch_add(1, Ordering::SeqCst);
        let fork_seed = self
            .seed
            .wrapping_add(fork_id)
            .wrapping_mul(FORK_SEED_MULTIPLIER);
        Self::new(fork_seed)
    }
}

impl Default for DeterministicRng {
    fn default() -> Self {
        Self::new(0)
    }
}
