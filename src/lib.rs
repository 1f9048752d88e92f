//! # BlockKV
//!
//! An embedded, file-backed key-value store with:
//! - Two memory-mapped regions sliced into fixed-size blocks (keys, values)
//! - Variable-length keys and values stored as block chains
//! - A chained-hash key index that shares the block link field
//! - Full reconstruction of every index from the raw bytes on open
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        KvStore                              │
//! │         put / put_if_absent / get / remove / keys           │
//! │                  (one RwLock per store)                     │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐   vno     ┌─────────────┐
//!   │  KeyIndex   │ ────────► │ ValueStore  │
//!   │ (buckets)   │           │ (vno→chain) │
//!   └──────┬──────┘           └──────┬──────┘
//!          ▼                         ▼
//!   ┌─────────────┐           ┌─────────────┐
//!   │  BlockPool  │           │  BlockPool  │
//!   │  {name}.idx │           │  {name}.dat │
//!   └─────────────┘           └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod hash;
pub mod region;
pub mod block;
pub mod store;
pub mod kvstore;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{BlockKvError, Result};
pub use config::Config;
pub use hash::{ConstHasher, KeyHasher, PolyHasher};
pub use kvstore::{Keys, KvStore, StoreStats};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of BlockKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
