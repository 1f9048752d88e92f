//! Configuration for BlockKV
//!
//! Centralized configuration with sensible defaults.
//!
//! The block layout carries no schema marker, so `key_payload_bytes`,
//! `value_payload_bytes` and `block_count` must be identical on every open
//! of the same store.

use std::path::PathBuf;

use crate::block::META_SIZE;
use crate::error::{BlockKvError, Result};
use crate::store::VNO_LEN;

/// Main configuration for a BlockKV instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Directory holding the backing files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── {name}.idx      (key region)
    ///     └── {name}.dat      (value region)
    pub data_dir: PathBuf,

    /// Base file name of the store
    pub name: String,

    // -------------------------------------------------------------------------
    // Block Layout
    // -------------------------------------------------------------------------
    /// Payload bytes per key block (must exceed the 4-byte value number slot)
    pub key_payload_bytes: usize,

    /// Payload bytes per value block
    pub value_payload_bytes: usize,

    /// Number of blocks in each region
    pub block_count: usize,

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------
    /// msync both regions when the store is closed
    pub flush_on_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./blockkv_data"),
            name: "store".to_string(),
            key_payload_bytes: 30,
            value_payload_bytes: 100,
            block_count: 1000,
            flush_on_close: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Size in bytes of one key block (meta + payload)
    pub fn key_block_size(&self) -> usize {
        META_SIZE + self.key_payload_bytes
    }

    /// Size in bytes of one value block (meta + payload)
    pub fn value_block_size(&self) -> usize {
        META_SIZE + self.value_payload_bytes
    }

    /// Capacity of the key region in bytes
    pub fn key_region_len(&self) -> usize {
        self.block_count * self.key_block_size()
    }

    /// Capacity of the value region in bytes
    pub fn value_region_len(&self) -> usize {
        self.block_count * self.value_block_size()
    }

    /// Path of the key region file
    pub fn key_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.idx", self.name))
    }

    /// Path of the value region file
    pub fn value_path(&self) -> PathBuf {
        self.data_dir.join(format!("{}.dat", self.name))
    }

    /// Reject layouts the store cannot be built on
    pub fn validate(&self) -> Result<()> {
        if self.key_payload_bytes <= VNO_LEN {
            return Err(BlockKvError::Config(format!(
                "key_payload_bytes={} must exceed the {}-byte value number slot",
                self.key_payload_bytes, VNO_LEN
            )));
        }
        if self.value_payload_bytes == 0 {
            return Err(BlockKvError::Config(
                "value_payload_bytes must be positive".to_string(),
            ));
        }
        if self.block_count == 0 {
            return Err(BlockKvError::Config(
                "block_count must be positive".to_string(),
            ));
        }
        // Block numbers live in a signed 32-bit pointer field
        if self.block_count > i32::MAX as usize {
            return Err(BlockKvError::Config(format!(
                "block_count={} exceeds the 31-bit block pointer range",
                self.block_count
            )));
        }
        if self.name.is_empty() {
            return Err(BlockKvError::Config("store name is empty".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the base file name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Set the payload bytes per key block
    pub fn key_payload_bytes(mut self, bytes: usize) -> Self {
        self.config.key_payload_bytes = bytes;
        self
    }

    /// Set the payload bytes per value block
    pub fn value_payload_bytes(mut self, bytes: usize) -> Self {
        self.config.value_payload_bytes = bytes;
        self
    }

    /// Set the number of blocks per region
    pub fn block_count(mut self, count: usize) -> Self {
        self.config.block_count = count;
        self
    }

    /// Flush the regions on close
    pub fn flush_on_close(mut self, flush: bool) -> Self {
        self.config.flush_on_close = flush;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.key_block_size(), 38);
        assert_eq!(config.value_block_size(), 108);
        assert_eq!(config.key_region_len(), 38_000);
    }

    #[test]
    fn test_key_payload_must_exceed_vno_slot() {
        let config = Config::builder().key_payload_bytes(4).build();
        assert!(matches!(config.validate(), Err(BlockKvError::Config(_))));

        let config = Config::builder().key_payload_bytes(5).build();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_sizes_rejected() {
        let config = Config::builder().value_payload_bytes(0).build();
        assert!(config.validate().is_err());

        let config = Config::builder().block_count(0).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_paths_follow_name() {
        let config = Config::builder().data_dir("/tmp/kv").name("t").build();
        assert_eq!(config.key_path(), PathBuf::from("/tmp/kv/t.idx"));
        assert_eq!(config.value_path(), PathBuf::from("/tmp/kv/t.dat"));
    }
}
