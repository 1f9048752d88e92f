//! Block Module
//!
//! Fixed-size blocks sliced out of a flat byte region.
//!
//! ## Block Format
//! ```text
//! ┌──────────────────────── meta (8) ───────────────────────┬──────────────┐
//! │ nextBlockNo: i32 BE (4)    │ length: i32 BE (4)         │ payload (P)  │
//! └────────────────────────────┴────────────────────────────┴──────────────┘
//! ```
//!
//! - `nextBlockNo == 0`  : block is free
//! - `nextBlockNo == -1` : block is in use, end of its chain
//! - `nextBlockNo > 0`   : block is in use, followed by that block
//! - `length > 0`        : block heads a logical item of `length` bytes
//! - `length == 0`       : continuation block
//!
//! Blocks are numbered from 1; block `n` starts at byte `(n - 1) * (8 + P)`.
//! Blocks never move, so the number is the block's identity.

pub mod pool;

pub use pool::{BlockPool, ScanReport};

/// 1-based block number within a region
pub type BlockId = u32;

/// Size of the meta header at the front of every block
pub const META_SIZE: usize = 8;

const POS_NEXT: usize = 0;
const POS_LEN: usize = 4;

/// Raw `nextBlockNo` of a free block
pub const NEXT_FREE: i32 = 0;

/// Raw `nextBlockNo` of an in-use block with no successor
pub const NEXT_END: i32 = -1;

// =============================================================================
// Chain Node (in-memory mirror of the meta header)
// =============================================================================

/// Role of a block, decoded from its `nextBlockNo` and `length` fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// On the free list
    Free,
    /// First block of an item of the given byte length
    Head(u32),
    /// Any later block of an item
    Continuation,
}

/// In-memory view of one block's links
///
/// `next` is an index into the owning pool, never an owning pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainNode {
    pub next: Option<BlockId>,
    pub role: Role,
}

impl ChainNode {
    pub const FREE: ChainNode = ChainNode {
        next: None,
        role: Role::Free,
    };

    pub fn is_head(&self) -> bool {
        matches!(self.role, Role::Head(_))
    }

    pub fn is_free(&self) -> bool {
        self.role == Role::Free
    }
}

// =============================================================================
// Block Views
// =============================================================================

fn read_i32(bytes: &[u8], pos: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[pos..pos + 4]);
    i32::from_be_bytes(raw)
}

fn write_i32(bytes: &mut [u8], pos: usize, v: i32) {
    bytes[pos..pos + 4].copy_from_slice(&v.to_be_bytes());
}

fn copy_out(payload: &[u8], offset: usize, dst: &mut [u8]) -> usize {
    if offset >= payload.len() {
        return 0;
    }
    let n = dst.len().min(payload.len() - offset);
    dst[..n].copy_from_slice(&payload[offset..offset + n]);
    n
}

/// Read-only view over one block
#[derive(Debug, Clone, Copy)]
pub struct Block<'a> {
    id: BlockId,
    bytes: &'a [u8],
}

impl<'a> Block<'a> {
    /// `bytes` must span exactly one block (meta + payload)
    pub fn new(id: BlockId, bytes: &'a [u8]) -> Self {
        debug_assert!(bytes.len() > META_SIZE);
        Self { id, bytes }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn next_block_no(&self) -> i32 {
        read_i32(self.bytes, POS_NEXT)
    }

    pub fn length(&self) -> i32 {
        read_i32(self.bytes, POS_LEN)
    }

    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[META_SIZE..]
    }

    /// Decode the meta header into a node (links are resolved by the pool)
    pub fn role(&self) -> Role {
        if self.next_block_no() == NEXT_FREE {
            Role::Free
        } else if self.length() > 0 {
            Role::Head(self.length() as u32)
        } else {
            Role::Continuation
        }
    }

    /// Copy payload bytes starting at `offset` into `dst`.
    ///
    /// Stops at whichever of `dst` or the block ends first; returns the
    /// number of bytes copied.
    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        copy_out(self.payload(), offset, dst)
    }
}

/// Mutable view over one block
#[derive(Debug)]
pub struct BlockMut<'a> {
    id: BlockId,
    bytes: &'a mut [u8],
}

impl<'a> BlockMut<'a> {
    /// `bytes` must span exactly one block (meta + payload)
    pub fn new(id: BlockId, bytes: &'a mut [u8]) -> Self {
        debug_assert!(bytes.len() > META_SIZE);
        Self { id, bytes }
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn next_block_no(&self) -> i32 {
        read_i32(self.bytes, POS_NEXT)
    }

    pub fn set_next_block_no(&mut self, next: i32) {
        write_i32(self.bytes, POS_NEXT, next);
    }

    pub fn length(&self) -> i32 {
        read_i32(self.bytes, POS_LEN)
    }

    pub fn set_length(&mut self, len: i32) {
        write_i32(self.bytes, POS_LEN, len);
    }

    pub fn read_at(&self, offset: usize, dst: &mut [u8]) -> usize {
        copy_out(&self.bytes[META_SIZE..], offset, dst)
    }

    /// Copy `src[src_offset..]` into the payload starting at `offset`.
    ///
    /// Never writes past the end of the block; returns the number of bytes
    /// written so callers can continue in the next block of a chain.
    pub fn write_at(&mut self, offset: usize, src: &[u8], src_offset: usize) -> usize {
        let payload = &mut self.bytes[META_SIZE..];
        if offset >= payload.len() || src_offset >= src.len() {
            return 0;
        }
        let n = (payload.len() - offset).min(src.len() - src_offset);
        payload[offset..offset + n].copy_from_slice(&src[src_offset..src_offset + n]);
        n
    }

    /// Zero the meta header. Payload bytes are left as they are.
    pub fn free(&mut self) {
        self.bytes[..META_SIZE].fill(0);
    }

    /// Provisionally mark the block in use before it is chained
    pub fn mark_used(&mut self) {
        self.set_next_block_no(NEXT_END);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_block(payload: usize) -> Vec<u8> {
        vec![0u8; META_SIZE + payload]
    }

    #[test]
    fn test_fresh_block_is_free() {
        let bytes = raw_block(8);
        let block = Block::new(1, &bytes);
        assert_eq!(block.next_block_no(), NEXT_FREE);
        assert_eq!(block.length(), 0);
        assert_eq!(block.role(), Role::Free);
    }

    #[test]
    fn test_meta_is_big_endian() {
        let mut bytes = raw_block(8);
        let mut block = BlockMut::new(3, &mut bytes);
        block.set_next_block_no(0x0102_0304);
        block.set_length(5);

        assert_eq!(&bytes[0..4], &[1, 2, 3, 4]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 5]);
        assert_eq!(Block::new(3, &bytes).role(), Role::Head(5));
    }

    #[test]
    fn test_mark_used_then_free() {
        let mut bytes = raw_block(4);
        let mut block = BlockMut::new(1, &mut bytes);
        block.mark_used();
        assert_eq!(block.next_block_no(), NEXT_END);
        block.write_at(0, b"abcd", 0);
        block.set_length(4);

        block.free();
        assert_eq!(block.next_block_no(), 0);
        assert_eq!(block.length(), 0);
        // payload is left as garbage
        assert_eq!(&bytes[META_SIZE..], b"abcd");
    }

    #[test]
    fn test_continuation_role() {
        let mut bytes = raw_block(4);
        BlockMut::new(1, &mut bytes).mark_used();
        assert_eq!(Block::new(1, &bytes).role(), Role::Continuation);
    }

    #[test]
    fn test_write_at_is_bounded_by_block() {
        let mut bytes = raw_block(4);
        let mut block = BlockMut::new(1, &mut bytes);

        assert_eq!(block.write_at(1, b"hello", 0), 3);
        assert_eq!(block.write_at(0, b"hello", 3), 2);
        assert_eq!(block.write_at(4, b"x", 0), 0);
        assert_eq!(block.write_at(0, b"x", 1), 0);
        assert_eq!(&bytes[META_SIZE..], b"loel");
    }

    #[test]
    fn test_read_at_is_bounded_by_both_sides() {
        let mut bytes = raw_block(4);
        BlockMut::new(1, &mut bytes).write_at(0, b"wxyz", 0);
        let block = Block::new(1, &bytes);

        let mut small = [0u8; 2];
        assert_eq!(block.read_at(1, &mut small), 2);
        assert_eq!(&small, b"xy");

        let mut large = [0u8; 10];
        assert_eq!(block.read_at(2, &mut large), 2);
        assert_eq!(&large[..2], b"yz");

        assert_eq!(block.read_at(4, &mut large), 0);
    }
}
