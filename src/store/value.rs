//! Value Store
//!
//! One block chain per value, addressed by the chain's head block number
//! (`vno`). Rewriting a value reuses its chain, growing or shrinking it to
//! the new length.

use std::collections::BTreeSet;

use crate::block::{BlockId, BlockPool, Role};
use crate::error::{BlockKvError, Result};
use crate::region::Region;

/// Chain-per-value store over a block pool
#[derive(Debug)]
pub struct ValueStore {
    pool: BlockPool,

    /// Head blocks of live value chains
    heads: BTreeSet<BlockId>,
}

impl ValueStore {
    /// Build the store over `region`; every root chain is a live value.
    pub fn open(region: Region, payload_size: usize) -> Result<Self> {
        let (pool, report) = BlockPool::open(region, payload_size)?;
        let heads: BTreeSet<BlockId> = report.roots.iter().copied().collect();

        tracing::info!(
            blocks = pool.block_count(),
            free = pool.free_count(),
            values = heads.len(),
            "Opened value store"
        );

        Ok(Self { pool, heads })
    }

    /// Longest value the 32-bit length field can describe
    pub fn max_value_len(&self) -> usize {
        i32::MAX as usize
    }

    fn live_head(&self, vno: i32) -> Option<BlockId> {
        let id = BlockId::try_from(vno).ok()?;
        self.heads.contains(&id).then_some(id)
    }

    pub fn contains(&self, vno: i32) -> bool {
        self.live_head(vno).is_some()
    }

    /// Bytes of value `vno`, `None` if no such value chain exists.
    pub fn read(&self, vno: i32) -> Option<Vec<u8>> {
        let head = self.live_head(vno)?;
        let Role::Head(len) = self.pool.role(head) else {
            return None;
        };
        let mut value = vec![0u8; len as usize];
        let read = self.pool.read_chain(head, &mut value);
        if read < value.len() {
            tracing::error!(vno = vno, expected = value.len(), read = read, "Value chain shorter than its length");
            value.truncate(read);
        }
        Some(value)
    }

    /// Write `value`, reusing the chain of `existing` when it is live.
    ///
    /// The chain is extended or trimmed to exactly the blocks `value` needs.
    /// Any shortfall is checked against the free list before the existing
    /// chain is touched. Returns the value's head block.
    pub fn store(&mut self, existing: Option<BlockId>, value: &[u8]) -> Result<BlockId> {
        if value.is_empty() {
            return Err(BlockKvError::EmptyValue);
        }
        if value.len() > self.max_value_len() {
            return Err(BlockKvError::ValueTooLong {
                len: value.len(),
                max: self.max_value_len(),
            });
        }
        let needed = self.pool.blocks_for(value.len());

        let reusable = existing.filter(|id| self.heads.contains(id));
        if let Some(vno) = existing {
            if reusable.is_none() {
                tracing::error!(vno = vno, "Value chain to overwrite is missing; allocating fresh");
            }
        }

        let head = match reusable {
            Some(head) => {
                self.resize_chain(head, needed)?;
                head
            }
            None => self.pool.allocate_chain(needed)?.0,
        };

        self.pool.write_chain(head, value);
        self.pool.set_length(head, value.len() as u32);
        self.heads.insert(head);

        tracing::debug!(vno = head, blocks = needed, len = value.len(), reused = reusable.is_some(), "Stored value");
        Ok(head)
    }

    fn resize_chain(&mut self, head: BlockId, needed: usize) -> Result<()> {
        let (have, tail) = self.pool.chain_span(head);

        if needed > have {
            let (extra, _) = self.pool.allocate_chain(needed - have)?;
            self.pool.set_next(tail, Some(extra));
        } else if needed < have {
            if let Some(keep) = self.pool.nth_in_chain(head, needed - 1) {
                if let Some(surplus) = self.pool.next(keep) {
                    self.pool.set_next(keep, None);
                    self.pool.release_chain(surplus);
                }
            }
        }
        Ok(())
    }

    /// Free value `vno`, returning its bytes. `None` if it does not exist.
    pub fn take(&mut self, vno: i32) -> Option<Vec<u8>> {
        let value = self.read(vno)?;
        self.release(vno);
        Some(value)
    }

    /// Free value `vno` without reading it. `false` if it does not exist.
    pub fn delete(&mut self, vno: i32) -> bool {
        self.release(vno)
    }

    fn release(&mut self, vno: i32) -> bool {
        let Some(head) = self.live_head(vno) else {
            return false;
        };
        self.heads.remove(&head);
        let released = self.pool.release_chain(head);
        tracing::debug!(vno = vno, released = released, "Released value");
        true
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    /// Log every value chain block by block
    pub fn dump(&self) {
        for &head in &self.heads {
            let mut blocks = Vec::new();
            let mut cur = Some(head);
            while let Some(id) = cur {
                blocks.push(id);
                cur = self.pool.next(id);
            }
            tracing::info!(vno = head, role = ?self.pool.role(head), blocks = ?blocks, "value");
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.pool.flush()
    }

    pub fn into_region(self) -> Region {
        self.pool.into_region()
    }
}
