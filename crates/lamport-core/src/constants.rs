//! TigerStyle constants for Lamport
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Actor Limits
// =============================================================================

/// Length of an actor ID in bytes (SHA-256 merkle link)
pub const ACTOR_ID_LENGTH_BYTES: usize = 32;

/// Maximum size of a serialized actor record in bytes (10 MB)
pub const ACTOR_STATE_SIZE_BYTES_MAX: usize = 10 * 1024 * 1024;

/// Maximum number of bound ports per actor
pub const ACTOR_PORTS_COUNT_MAX: usize = 10_000;

/// Maximum length of a port name in bytes
pub const PORT_NAME_LENGTH_BYTES_MAX: usize = 256;

// =============================================================================
// Message Limits
// =============================================================================

/// Maximum number of capabilities transferred by a single message
pub const MESSAGE_CAPS_COUNT_MAX: usize = 256;

/// Maximum number of tags in a single tag wait
pub const WAIT_TAGS_COUNT_MAX: usize = 1024;

/// Maximum number of routing attempts for one message
///
/// A resident handle can unload between lookup and enqueue; routing retries
/// against the registry up to this many times.
pub const MESSAGE_DELIVERY_ATTEMPTS_MAX: u32 = 1024;

/// Default number of routing attempts for one message
pub const MESSAGE_DELIVERY_ATTEMPTS_DEFAULT: u32 = 16;

// =============================================================================
// Code Storage
// =============================================================================

/// Default size of a code chunk in bytes
///
/// Code blobs larger than this are split into content-addressed fragments.
pub const CODE_CHUNK_SIZE_BYTES_DEFAULT: usize = 65_533;

/// Maximum configurable size of a code chunk in bytes (1 MB)
pub const CODE_CHUNK_SIZE_BYTES_MAX: usize = 1024 * 1024;

/// Maximum number of chunks a single code blob may be split into
pub const CODE_CHUNKS_COUNT_MAX: usize = 16_384;

// =============================================================================
// Garbage Collection
// =============================================================================

/// Maximum number of actors visited by a single reachability pass
pub const GC_VISITED_COUNT_MAX: usize = 10_000_000;

// =============================================================================
// DST (Deterministic Simulation Testing)
// =============================================================================

/// Environment variable holding the DST seed
pub const DST_SEED_ENV_VAR: &str = "DST_SEED";

/// Maximum number of simulated scheduling yields injected per operation
pub const DST_YIELDS_COUNT_MAX: u64 = 64;

// Compile-time assertions for constant validity
const _: () = {
    assert!(ACTOR_ID_LENGTH_BYTES == 32);
    assert!(ACTOR_STATE_SIZE_BYTES_MAX <= 100 * 1024 * 1024);
    assert!(CODE_CHUNK_SIZE_BYTES_DEFAULT <= CODE_CHUNK_SIZE_BYTES_MAX);
    assert!(MESSAGE_DELIVERY_ATTEMPTS_DEFAULT <= MESSAGE_DELIVERY_ATTEMPTS_MAX);
    assert!(MESSAGE_DELIVERY_ATTEMPTS_DEFAULT >= 1);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_chunk_size_matches_reference_system() {
        assert_eq!(CODE_CHUNK_SIZE_BYTES_DEFAULT, 65_533);
    }

    #[test]
    fn test_limits_have_units_in_names() {
        // All byte limits end in _BYTES_, all count limits in _COUNT_
        let _: usize = ACTOR_ID_LENGTH_BYTES;
        let _: usize = PORT_NAME_LENGTH_BYTES_MAX;
        let _: usize = WAIT_TAGS_COUNT_MAX;
        let _: usize = GC_VISITED_COUNT_MAX;
    }
}
