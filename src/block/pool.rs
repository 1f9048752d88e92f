//! Block Pool
//!
//! Arena over one region: owns every block, the free list and the in-memory
//! link table. All "pointers" between blocks are `BlockId` indices into this
//! arena; every mutation is written through to the region's meta headers so
//! the in-memory view can be rebuilt from the bytes alone.
//!
//! ## Reconstruction
//! `BlockPool::open` scans the region once:
//! 1. Classify every block: `nextBlockNo == 0` is free, anything else in use
//! 2. Link in-use blocks along their `nextBlockNo` and count predecessors
//! 3. Report heads (`length > 0`) and roots (heads with no predecessor)
//!
//! The predecessor counts are discarded once the scan is done.

use std::collections::VecDeque;
use std::ops::Range;

use crate::error::{BlockKvError, Result};
use crate::region::Region;

use super::{Block, BlockId, BlockMut, ChainNode, Role, META_SIZE, NEXT_END};

/// Outcome of the start-up scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Heads with no in-use predecessor, in block order
    pub roots: Vec<BlockId>,
    /// Every head block, in block order
    pub heads: Vec<BlockId>,
    /// Number of in-use blocks
    pub in_use: usize,
    /// Pointers to free, out-of-range or already-claimed blocks
    pub dangling: usize,
    /// In-use continuation blocks nothing points at
    pub orphans: usize,
}

/// Fixed-capacity block allocator over one region
#[derive(Debug)]
pub struct BlockPool {
    region: Region,
    payload_size: usize,
    block_size: usize,
    block_count: usize,

    /// Link table, indexed by block number (slot 0 unused)
    nodes: Vec<ChainNode>,

    /// Free blocks, any of which is as good as another
    free: VecDeque<BlockId>,
}

impl BlockPool {
    /// Slice `region` into blocks of `META_SIZE + payload_size` bytes and
    /// rebuild the free list and chain links from the meta headers.
    pub fn open(region: Region, payload_size: usize) -> Result<(Self, ScanReport)> {
        if payload_size == 0 {
            return Err(BlockKvError::Config(
                "block payload size must be positive".to_string(),
            ));
        }
        let block_size = META_SIZE + payload_size;
        let block_count = region.len() / block_size;
        if block_count == 0 {
            return Err(BlockKvError::Config(format!(
                "region of {} bytes cannot hold one {}-byte block",
                region.len(),
                block_size
            )));
        }
        if block_count > i32::MAX as usize {
            return Err(BlockKvError::Config(format!(
                "{} blocks exceed the 31-bit block pointer range",
                block_count
            )));
        }

        let mut pool = Self {
            region,
            payload_size,
            block_size,
            block_count,
            nodes: vec![ChainNode::FREE; block_count + 1],
            free: VecDeque::new(),
        };
        let report = pool.reconstruct();
        Ok((pool, report))
    }

    fn reconstruct(&mut self) -> ScanReport {
        // Pass 1: classify
        let mut in_use: Vec<(BlockId, i32)> = Vec::new();
        for id in 1..=self.block_count as BlockId {
            let (role, raw_next) = {
                let block = self.block(id);
                (block.role(), block.next_block_no())
            };
            self.nodes[id as usize] = ChainNode { next: None, role };
            if role == Role::Free {
                self.free.push_back(id);
            } else {
                in_use.push((id, raw_next));
            }
        }

        // Pass 2: link, counting predecessors
        let mut in_degree = vec![0u8; self.block_count + 1];
        let mut dangling = 0;
        for &(id, raw_next) in &in_use {
            if raw_next == NEXT_END {
                continue;
            }
            match self.resolve(raw_next) {
                Some(next) if in_degree[next as usize] == 0 => {
                    self.link(id, next);
                    in_degree[next as usize] = 1;
                }
                _ => {
                    dangling += 1;
                    tracing::warn!(block = id, next = raw_next, "Ignoring dangling block pointer");
                }
            }
        }

        // Pass 3: heads and roots
        let mut report = ScanReport {
            in_use: in_use.len(),
            dangling,
            ..ScanReport::default()
        };
        for &(id, _) in &in_use {
            let unreferenced = in_degree[id as usize] == 0;
            if self.nodes[id as usize].is_head() {
                report.heads.push(id);
                if unreferenced {
                    report.roots.push(id);
                }
            } else if unreferenced {
                report.orphans += 1;
            }
        }

        if report.orphans > 0 {
            tracing::warn!(orphans = report.orphans, "Found unreachable in-use blocks");
        }
        tracing::debug!(
            blocks = self.block_count,
            free = self.free.len(),
            in_use = report.in_use,
            heads = report.heads.len(),
            roots = report.roots.len(),
            "Reconstructed block pool"
        );

        report
    }

    /// Resolve a raw pointer to an in-use block of this pool
    fn resolve(&self, raw_next: i32) -> Option<BlockId> {
        if raw_next <= 0 || raw_next as usize > self.block_count {
            return None;
        }
        let id = raw_next as BlockId;
        (!self.nodes[id as usize].is_free()).then_some(id)
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn payload_size(&self) -> usize {
        self.payload_size
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn used_count(&self) -> usize {
        self.block_count - self.free.len()
    }

    /// Blocks needed to hold `len` payload bytes
    pub fn blocks_for(&self, len: usize) -> usize {
        len.div_ceil(self.payload_size)
    }

    fn range(&self, id: BlockId) -> Range<usize> {
        debug_assert!(id >= 1 && id as usize <= self.block_count);
        let start = (id as usize - 1) * self.block_size;
        start..start + self.block_size
    }

    pub fn block(&self, id: BlockId) -> Block<'_> {
        let range = self.range(id);
        Block::new(id, &self.region.as_slice()[range])
    }

    fn block_mut(&mut self, id: BlockId) -> BlockMut<'_> {
        let range = self.range(id);
        BlockMut::new(id, &mut self.region.as_mut_slice()[range])
    }

    // =========================================================================
    // Links
    // =========================================================================

    pub fn node(&self, id: BlockId) -> ChainNode {
        self.nodes[id as usize]
    }

    pub fn next(&self, id: BlockId) -> Option<BlockId> {
        self.nodes[id as usize].next
    }

    pub fn role(&self, id: BlockId) -> Role {
        self.nodes[id as usize].role
    }

    pub fn is_head(&self, id: BlockId) -> bool {
        self.nodes[id as usize].is_head()
    }

    /// In-memory link only; used while reconstructing
    fn link(&mut self, id: BlockId, next: BlockId) {
        self.nodes[id as usize].next = Some(next);
    }

    /// Persist `nextBlockNo` and update the in-memory link.
    ///
    /// `None` keeps the block in use as the end of its chain.
    pub fn set_next(&mut self, id: BlockId, next: Option<BlockId>) {
        let raw = next.map_or(NEXT_END, |n| n as i32);
        self.block_mut(id).set_next_block_no(raw);
        self.nodes[id as usize].next = next;
    }

    /// Persist `length` and retag the block as head (or continuation for 0)
    pub fn set_length(&mut self, id: BlockId, len: u32) {
        debug_assert!(len <= i32::MAX as u32);
        self.block_mut(id).set_length(len as i32);
        self.nodes[id as usize].role = if len > 0 {
            Role::Head(len)
        } else {
            Role::Continuation
        };
    }

    /// Number of blocks reachable from `head` and the last of them
    pub fn chain_span(&self, head: BlockId) -> (usize, BlockId) {
        let mut count = 1;
        let mut tail = head;
        while let Some(next) = self.next(tail) {
            count += 1;
            tail = next;
        }
        (count, tail)
    }

    /// The `n`-th block (0-based) following links from `head`
    pub fn nth_in_chain(&self, head: BlockId, n: usize) -> Option<BlockId> {
        let mut cur = head;
        for _ in 0..n {
            cur = self.next(cur)?;
        }
        Some(cur)
    }

    // =========================================================================
    // Allocation
    // =========================================================================

    pub fn ensure_available(&self, needed: usize) -> Result<()> {
        if needed > self.free.len() {
            return Err(BlockKvError::NotEnoughSpace {
                needed,
                available: self.free.len(),
            });
        }
        Ok(())
    }

    /// Take one block off the free list and mark it in use
    pub fn allocate(&mut self) -> Option<BlockId> {
        let id = self.free.pop_front()?;
        self.block_mut(id).mark_used();
        self.nodes[id as usize] = ChainNode {
            next: None,
            role: Role::Continuation,
        };
        Some(id)
    }

    /// Allocate `count` blocks linked in order; returns `(head, tail)`.
    ///
    /// Checks availability first, so a failure leaves the pool untouched.
    pub fn allocate_chain(&mut self, count: usize) -> Result<(BlockId, BlockId)> {
        if count == 0 {
            return Err(BlockKvError::NotEnoughSpace {
                needed: 0,
                available: self.free.len(),
            });
        }
        self.ensure_available(count)?;

        let head = self.allocate().ok_or(BlockKvError::NotEnoughSpace {
            needed: count,
            available: 0,
        })?;
        let mut tail = head;
        for _ in 1..count {
            let id = self.allocate().ok_or(BlockKvError::NotEnoughSpace {
                needed: count,
                available: 0,
            })?;
            self.set_next(tail, Some(id));
            tail = id;
        }

        tracing::trace!(head = head, tail = tail, count = count, "Allocated chain");
        Ok((head, tail))
    }

    /// Zero the block's meta and return it to the free list
    pub fn recycle(&mut self, id: BlockId) {
        if self.nodes[id as usize].is_free() {
            tracing::error!(block = id, "Block recycled twice");
            return;
        }
        self.block_mut(id).free();
        self.nodes[id as usize] = ChainNode::FREE;
        self.free.push_back(id);
    }

    /// Recycle every block reachable from `head`; returns how many.
    ///
    /// Callers must cut the chain from any live successor first.
    pub fn release_chain(&mut self, head: BlockId) -> usize {
        let mut released = 0;
        let mut cur = Some(head);
        while let Some(id) = cur {
            cur = self.next(id);
            self.recycle(id);
            released += 1;
        }
        released
    }

    // =========================================================================
    // Payload I/O
    // =========================================================================

    pub fn read_payload(&self, id: BlockId, offset: usize, dst: &mut [u8]) -> usize {
        self.block(id).read_at(offset, dst)
    }

    pub fn write_payload(&mut self, id: BlockId, offset: usize, src: &[u8]) -> usize {
        self.block_mut(id).write_at(offset, src, 0)
    }

    /// Write `data` across the chain starting at `head`, one full payload
    /// per block; returns the number of bytes written.
    pub fn write_chain(&mut self, head: BlockId, data: &[u8]) -> usize {
        let mut written = 0;
        let mut cur = Some(head);
        while let Some(id) = cur {
            if written >= data.len() {
                break;
            }
            written += self.block_mut(id).write_at(0, data, written);
            cur = self.next(id);
        }
        written
    }

    /// Fill `dst` from the chain starting at `head`; returns bytes read.
    pub fn read_chain(&self, head: BlockId, dst: &mut [u8]) -> usize {
        let mut read = 0;
        let mut cur = Some(head);
        while let Some(id) = cur {
            if read >= dst.len() {
                break;
            }
            read += self.read_payload(id, 0, &mut dst[read..]);
            cur = self.next(id);
        }
        read
    }

    // =========================================================================
    // Region
    // =========================================================================

    /// Head blocks in region order, straight from the link table
    pub fn heads(&self) -> impl Iterator<Item = BlockId> + '_ {
        (1..=self.block_count as BlockId).filter(move |&id| self.is_head(id))
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn flush(&self) -> Result<()> {
        self.region.flush()
    }

    pub fn into_region(self) -> Region {
        self.region
    }
}
