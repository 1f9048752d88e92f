//! Store Module
//!
//! The two block-chain stores the facade composes.
//!
//! ## Key Region
//! ```text
//! bucket(hash) ─► ┌──────────────────────┐   ┌──────────┐   ┌──────────────────────┐
//!                 │ len=K1 │ vno │ key1… │ ─►│ len=0 │… │ ─►│ len=K2 │ vno │ key2… │ ─► end
//!                 └──────────────────────┘   └──────────┘   └──────────────────────┘
//!                 └──────── key chain 1 ──────────────────┘ └──── key chain 2 ─────┘
//! ```
//! Keys sharing a bucket are spliced into one singly-linked list; a block
//! with `length > 0` marks where the next key starts.
//!
//! ## Value Region
//! ```text
//! vno ─► ┌──────────────────┐   ┌────────────┐
//!        │ len=V │ value…   │ ─►│ len=0 │ …  │ ─► end
//!        └──────────────────┘   └────────────┘
//! ```
//! A value is addressed by its head block number (`vno`), which is stored in
//! the first four payload bytes of the owning key chain.

mod key;
mod value;

pub use key::{KeyHit, KeyIndex, MAX_KEY_BLOCKS};
pub use value::ValueStore;

/// Bytes reserved at the front of every key chain for the value number
pub const VNO_LEN: usize = 4;
