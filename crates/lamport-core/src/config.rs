//! Configuration for Lamport
//!
//! TigerStyle: Explicit defaults, validation, reasonable limits.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Main configuration for Lamport
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LamportConfig {
    /// Hypervisor configuration
    #[serde(default)]
    pub hypervisor: HypervisorConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl LamportConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.hypervisor.validate()?;
        self.storage.validate()?;
        Ok(())
    }
}

/// Hypervisor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HypervisorConfig {
    /// First nonce used for top-level actor ids
    ///
    /// The root actor is always the one derived from nonce 0, so a hypervisor
    /// resumed from a checkpoint starts past the actors it already created.
    #[serde(default)]
    pub nonce_initial: u64,

    /// Routing attempts per message before giving up
    #[serde(default = "default_delivery_attempts")]
    pub delivery_attempts_max: u32,
}

fn default_delivery_attempts() -> u32 {
    MESSAGE_DELIVERY_ATTEMPTS_DEFAULT
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            nonce_initial: 0,
            delivery_attempts_max: default_delivery_attempts(),
        }
    }
}

impl HypervisorConfig {
    fn validate(&self) -> Result<()> {
        if self.delivery_attempts_max == 0 {
            return Err(Error::InvalidConfiguration {
                field: "hypervisor.delivery_attempts_max".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.delivery_attempts_max > MESSAGE_DELIVERY_ATTEMPTS_MAX {
            return Err(Error::InvalidConfiguration {
                field: "hypervisor.delivery_attempts_max".into(),
                reason: format!(
                    "{} exceeds limit {}",
                    self.delivery_attempts_max, MESSAGE_DELIVERY_ATTEMPTS_MAX
                ),
            });
        }

        Ok(())
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Code blobs above this size are chunked before storage
    #[serde(default = "default_code_chunk_size")]
    pub code_chunk_size_bytes: usize,
}

fn default_code_chunk_size() -> usize {
    CODE_CHUNK_SIZE_BYTES_DEFAULT
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            code_chunk_size_bytes: default_code_chunk_size(),
        }
    }
}

impl StorageConfig {
    fn validate(&self) -> Result<()> {
        if self.code_chunk_size_bytes == 0 {
            return Err(Error::InvalidConfiguration {
                field: "storage.code_chunk_size_bytes".into(),
                reason: "must be at least 1".into(),
            });
        }

        if self.code_chunk_size_bytes > CODE_CHUNK_SIZE_BYTES_MAX {
            return Err(Error::InvalidConfiguration {
                field: "storage.code_chunk_size_bytes".into(),
                reason: format!(
                    "{} exceeds limit {}",
                    self.code_chunk_size_bytes, CODE_CHUNK_SIZE_BYTES_MAX
                ),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = LamportConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hypervisor.nonce_initial, 0);
        assert_eq!(config.storage.code_chunk_size_bytes, 65_533);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let mut config = LamportConfig::default();
        config.storage.code_chunk_size_bytes = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage.code_chunk_size_bytes"));
    }

    #[test]
    fn test_delivery_attempts_bounds() {
        let mut config = LamportConfig::default();
        config.hypervisor.delivery_attempts_max = MESSAGE_DELIVERY_ATTEMPTS_MAX + 1;
        assert!(config.validate().is_err());

        config.hypervisor.delivery_attempts_max = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: LamportConfig =
            serde_json::from_str(r#"{"hypervisor": {"nonce_initial": 3}}"#).unwrap();
        assert_eq!(config.hypervisor.nonce_initial, 3);
        assert_eq!(
            config.hypervisor.delivery_attempts_max,
            MESSAGE_DELIVERY_ATTEMPTS_DEFAULT
        );
        assert_eq!(
            config.storage.code_chunk_size_bytes,
            CODE_CHUNK_SIZE_BYTES_DEFAULT
        );
    }
}
