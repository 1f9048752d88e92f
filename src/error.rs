//! Error types for BlockKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using BlockKvError
pub type Result<T> = std::result::Result<T, BlockKvError>;

/// Unified error type for BlockKV operations
#[derive(Debug, Error)]
pub enum BlockKvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Capacity Errors
    // -------------------------------------------------------------------------
    #[error("Not enough free blocks: needed {needed}, available {available}")]
    NotEnoughSpace { needed: usize, available: usize },

    #[error("Key too long: {len} bytes (max {max})")]
    KeyTooLong { len: usize, max: usize },

    #[error("Value too long: {len} bytes (max {max})")]
    ValueTooLong { len: usize, max: usize },

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("Empty key")]
    EmptyKey,

    #[error("Empty value")]
    EmptyValue,

    // -------------------------------------------------------------------------
    // Structural Errors
    // -------------------------------------------------------------------------
    #[error("Structural corruption: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BlockKvError {
    /// True for failures that reject a single write but leave the store
    /// structurally valid (capacity exhaustion, oversize or empty input).
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            BlockKvError::NotEnoughSpace { .. }
                | BlockKvError::KeyTooLong { .. }
                | BlockKvError::ValueTooLong { .. }
                | BlockKvError::EmptyKey
                | BlockKvError::EmptyValue
        )
    }
}
