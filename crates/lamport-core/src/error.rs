//! Error types for Lamport
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for Lamport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Lamport error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Actor Errors
    // =========================================================================
    #[error("Actor not found: {id}")]
    ActorNotFound { id: String },

    #[error("Actor creation failed: {id}, reason: {reason}")]
    ActorCreationFailed { id: String, reason: String },

    #[error("Container type not registered: {container_type}")]
    ContainerTypeNotRegistered { container_type: u32 },

    #[error("Container fault: {reason}")]
    ContainerFault { reason: String },

    // =========================================================================
    // Protocol Misuse
    // =========================================================================
    #[error("Actor {actor_id} is already waiting on tags")]
    AlreadyWaitingOnTags { actor_id: String },

    #[error("Cannot bind port to a name that is already bound: {name}")]
    PortNameAlreadyBound { name: String },

    #[error("Cannot bind a capability that is already bound: {dest_id}/{tag}")]
    CapabilityAlreadyBound { dest_id: String, tag: u64 },

    #[error("Message must not contain bound capabilities: {dest_id}/{tag}")]
    MessageContainsBoundCapability { dest_id: String, tag: u64 },

    #[error("Capability not held by actor {actor_id}: {dest_id}/{tag}")]
    CapabilityNotHeld {
        actor_id: String,
        dest_id: String,
        tag: u64,
    },

    #[error("Port not found: {name}")]
    PortNotFound { name: String },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid actor ID: {id}, reason: {reason}")]
    InvalidActorId { id: String, reason: String },

    #[error("Port name too long: {length} bytes exceeds limit of {limit} bytes")]
    PortNameTooLong { length: usize, limit: usize },

    #[error("Too many ports: {count} exceeds limit of {limit}")]
    TooManyPorts { count: usize, limit: usize },

    #[error("Too many capabilities in message: {count} exceeds limit of {limit}")]
    TooManyCapabilities { count: usize, limit: usize },

    #[error("Too many tags in wait: {count} exceeds limit of {limit}")]
    TooManyTags { count: usize, limit: usize },

    #[error("Actor state too large: {size} bytes exceeds limit of {limit} bytes")]
    ActorStateTooLarge { size: usize, limit: usize },

    #[error("Code too large: {size} bytes needs {chunks} chunks, limit is {limit} bytes")]
    CodeTooLarge {
        size: usize,
        chunks: usize,
        limit: usize,
    },

    // =========================================================================
    // Storage Errors
    // =========================================================================
    #[error("Storage read failed: {key}, reason: {reason}")]
    StorageReadFailed { key: String, reason: String },

    #[error("Storage write failed: {key}, reason: {reason}")]
    StorageWriteFailed { key: String, reason: String },

    #[error("Code chunk not found: {hash}")]
    ChunkNotFound { hash: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("Deserialization failed: {reason}")]
    DeserializationFailed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an actor not found error
    pub fn actor_not_found(id: impl Into<String>) -> Self {
        Self::ActorNotFound { id: id.into() }
    }

    /// Create a container fault with a free-form reason
    ///
    /// Containers use this to fail the message they are processing.
    pub fn container(reason: impl Into<String>) -> Self {
        Self::ContainerFault {
            reason: reason.into(),
        }
    }

    /// Create a storage read failed error
    pub fn storage_read_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageReadFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a storage write failed error
    pub fn storage_write_failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StorageWriteFailed {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is a protocol misuse by the calling container
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(
            self,
            Self::AlreadyWaitingOnTags { .. }
                | Self::PortNameAlreadyBound { .. }
                | Self::CapabilityAlreadyBound { .. }
                | Self::MessageContainsBoundCapability { .. }
                | Self::CapabilityNotHeld { .. }
                | Self::PortNotFound { .. }
        )
    }

    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::StorageReadFailed { .. } | Self::StorageWriteFailed { .. }
        )
    }
}
