//! Key Index
//!
//! Chained hash table of key chains over a block pool.
//!
//! A key chain holds `vno (4, BE) ++ key bytes`, written across as many
//! blocks as needed; the head block's `length` is the key length. Keys whose
//! hashes collide share one physical list: the tail of one key chain links
//! to the head of the next, and a walk recognises the boundary by the next
//! block's `length > 0`. New keys are inserted at the front of their bucket.

use std::collections::{BTreeSet, HashMap};

use crate::block::{BlockId, BlockPool, Role};
use crate::error::{BlockKvError, Result};
use crate::hash::KeyHasher;
use crate::region::Region;

use super::VNO_LEN;

/// Longest chain a key may occupy (block counts are encoded as `i16`)
pub const MAX_KEY_BLOCKS: usize = i16::MAX as usize;

/// Location of a key found by `KeyIndex::lookup`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyHit {
    /// Head block of the key chain
    pub head: BlockId,
    /// Last block of the key chain
    pub tail: BlockId,
    /// Block immediately before `head` in the bucket chain, `None` when the
    /// key is the bucket's first
    pub pred: Option<BlockId>,
    /// Value number stored in the key chain (0 when no value is attached)
    pub vno: i32,
}

/// A fully read key chain
struct KeyEntry {
    key: Vec<u8>,
    vno: i32,
    tail: BlockId,
}

/// Outcome of reading ahead through one key chain
struct ReadAhead {
    filled: usize,
    tail: BlockId,
}

fn decode_vno(bytes: &[u8]) -> i32 {
    let mut raw = [0u8; VNO_LEN];
    raw.copy_from_slice(&bytes[..VNO_LEN]);
    i32::from_be_bytes(raw)
}

/// Hash index of key chains
#[derive(Debug)]
pub struct KeyIndex {
    pool: BlockPool,
    hasher: Box<dyn KeyHasher>,

    /// hash → first head block of the bucket chain
    buckets: HashMap<u32, BlockId>,

    /// Every live key head, for enumeration
    heads: BTreeSet<BlockId>,
}

impl KeyIndex {
    /// Build the index over `region`, rebuilding buckets from the blocks.
    pub fn open(region: Region, payload_size: usize, hasher: Box<dyn KeyHasher>) -> Result<Self> {
        if payload_size <= VNO_LEN {
            return Err(BlockKvError::Config(format!(
                "key payload of {} bytes cannot hold the {}-byte value number",
                payload_size, VNO_LEN
            )));
        }
        let (pool, report) = BlockPool::open(region, payload_size)?;

        let mut index = Self {
            pool,
            hasher,
            buckets: HashMap::new(),
            heads: report.heads.iter().copied().collect(),
        };

        for &root in &report.roots {
            let Some(entry) = index.read_entry(root) else {
                tracing::warn!(head = root, "Skipping unreadable key chain");
                continue;
            };
            let hash = index.hasher.hash(&entry.key);
            if let Some(existing) = index.buckets.insert(hash, root) {
                // Two chains claim one bucket: join them
                let (_, tail) = index.pool.chain_span(root);
                index.pool.set_next(tail, Some(existing));
                tracing::warn!(hash = hash, head = root, other = existing, "Merged split bucket chain");
            }
        }

        tracing::info!(
            blocks = index.pool.block_count(),
            free = index.pool.free_count(),
            keys = index.heads.len(),
            buckets = index.buckets.len(),
            "Opened key index"
        );

        Ok(index)
    }

    pub fn hash(&self, key: &[u8]) -> u32 {
        self.hasher.hash(key)
    }

    /// Longest key that fits in `MAX_KEY_BLOCKS` blocks
    pub fn max_key_len(&self) -> usize {
        (MAX_KEY_BLOCKS * self.pool.payload_size() - VNO_LEN).min(i32::MAX as usize)
    }

    // =========================================================================
    // Chain Reading
    // =========================================================================

    /// Read `buf.len()` bytes of the key chain starting at `head`, stopping
    /// early at the start of the next key.
    fn read_ahead(&self, head: BlockId, buf: &mut [u8]) -> ReadAhead {
        let mut filled = 0;
        let mut tail = head;
        let mut cur = Some(head);
        while let Some(id) = cur {
            if filled >= buf.len() || (id != head && self.pool.is_head(id)) {
                break;
            }
            filled += self.pool.read_payload(id, 0, &mut buf[filled..]);
            tail = id;
            cur = self.pool.next(id);
        }

        if let Some(next) = cur {
            if self.pool.role(next) == Role::Continuation {
                tracing::error!(head = head, tail = tail, next = next, "Key chain runs into a stray continuation block");
            }
        }

        ReadAhead { filled, tail }
    }

    fn read_entry(&self, head: BlockId) -> Option<KeyEntry> {
        let Role::Head(len) = self.pool.role(head) else {
            return None;
        };
        let len = len as usize;
        if len > self.max_key_len() {
            return None;
        }
        let mut buf = vec![0u8; VNO_LEN + len];
        let ahead = self.read_ahead(head, &mut buf);
        if ahead.filled < buf.len() {
            return None;
        }
        let vno = decode_vno(&buf);
        Some(KeyEntry {
            key: buf.split_off(VNO_LEN),
            vno,
            tail: ahead.tail,
        })
    }

    /// Key bytes of the chain headed by `head`
    pub fn read_key(&self, head: BlockId) -> Option<Vec<u8>> {
        self.read_entry(head).map(|entry| entry.key)
    }

    // =========================================================================
    // Index Operations
    // =========================================================================

    /// Find `key` in the bucket chain of `hash`.
    ///
    /// `None` is the normal outcome for a hash shared with other keys.
    pub fn lookup(&self, hash: u32, key: &[u8]) -> Option<KeyHit> {
        let want = u32::try_from(key.len()).ok().filter(|&len| len > 0)?;
        let mut buf = vec![0u8; VNO_LEN + key.len()];

        let mut pred = None;
        let mut cur = self.buckets.get(&hash).copied();
        while let Some(id) = cur {
            if self.pool.role(id) != Role::Head(want) {
                pred = Some(id);
                cur = self.pool.next(id);
                continue;
            }

            let ahead = self.read_ahead(id, &mut buf);
            if ahead.filled == buf.len() && buf[VNO_LEN..] == *key {
                return Some(KeyHit {
                    head: id,
                    tail: ahead.tail,
                    pred,
                    vno: decode_vno(&buf),
                });
            }

            pred = Some(ahead.tail);
            cur = self.pool.next(ahead.tail);
        }
        None
    }

    /// Store a new key chain at the front of its bucket with value number 0.
    pub fn insert(&mut self, hash: u32, key: &[u8]) -> Result<BlockId> {
        if key.is_empty() {
            return Err(BlockKvError::EmptyKey);
        }
        let needed = self.pool.blocks_for(VNO_LEN + key.len());
        if needed > MAX_KEY_BLOCKS || key.len() > self.max_key_len() {
            return Err(BlockKvError::KeyTooLong {
                len: key.len(),
                max: self.max_key_len(),
            });
        }

        let (head, tail) = self.pool.allocate_chain(needed)?;

        let mut entry = Vec::with_capacity(VNO_LEN + key.len());
        entry.extend_from_slice(&0i32.to_be_bytes());
        entry.extend_from_slice(key);
        self.pool.write_chain(head, &entry);
        self.pool.set_length(head, key.len() as u32);

        if let Some(old) = self.buckets.insert(hash, head) {
            self.pool.set_next(tail, Some(old));
        }
        self.heads.insert(head);

        tracing::debug!(hash = hash, head = head, blocks = needed, key_len = key.len(), "Inserted key");
        Ok(head)
    }

    /// Unlink `key` from its bucket and recycle its blocks.
    pub fn remove(&mut self, hash: u32, key: &[u8]) -> bool {
        match self.lookup(hash, key) {
            Some(hit) => {
                self.unlink(hash, hit);
                true
            }
            None => false,
        }
    }

    fn unlink(&mut self, hash: u32, hit: KeyHit) {
        let succ = self.pool.next(hit.tail);

        match hit.pred {
            None => match succ {
                Some(next) => {
                    self.buckets.insert(hash, next);
                }
                None => {
                    self.buckets.remove(&hash);
                }
            },
            Some(pred) => self.pool.set_next(pred, succ),
        }
        self.heads.remove(&hit.head);

        // Cut the tail loose so recycling stops at this key
        self.pool.set_next(hit.tail, None);
        let released = self.pool.release_chain(hit.head);

        tracing::debug!(hash = hash, head = hit.head, released = released, "Removed key");
    }

    /// Point the key chain at `head` to value chain `vno`
    pub fn write_value_no(&mut self, head: BlockId, vno: BlockId) {
        self.pool.write_payload(head, 0, &(vno as i32).to_be_bytes());
    }

    // =========================================================================
    // Enumeration
    // =========================================================================

    /// Snapshot of live key heads
    pub fn head_ids(&self) -> Vec<BlockId> {
        self.heads.iter().copied().collect()
    }

    /// Key stored at `head`, if it is still a live key head
    pub fn key_at(&self, head: BlockId) -> Option<Vec<u8>> {
        if !self.heads.contains(&head) {
            return None;
        }
        self.read_key(head)
    }

    /// Keys found by visiting every head block in region order,
    /// independent of the enumeration set.
    pub fn scan_keys(&self) -> Vec<Vec<u8>> {
        self.pool
            .heads()
            .filter_map(|head| self.read_key(head))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.heads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heads.is_empty()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn pool(&self) -> &BlockPool {
        &self.pool
    }

    /// Log every bucket chain
    pub fn dump(&self) {
        let mut buckets: Vec<_> = self.buckets.iter().map(|(&h, &b)| (h, b)).collect();
        buckets.sort_unstable();

        for (hash, root) in buckets {
            let mut cur = Some(root);
            while let Some(id) = cur {
                if !self.pool.is_head(id) {
                    cur = self.pool.next(id);
                    continue;
                }
                match self.read_entry(id) {
                    Some(entry) => {
                        tracing::info!(hash = hash, head = id, tail = entry.tail, vno = entry.vno, key = ?entry.key, "key");
                        cur = self.pool.next(entry.tail);
                    }
                    None => {
                        tracing::info!(hash = hash, head = id, "key (unreadable)");
                        cur = self.pool.next(id);
                    }
                }
            }
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.pool.flush()
    }

    pub fn into_region(self) -> Region {
        self.pool.into_region()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::META_SIZE;
    use crate::hash::{ConstHasher, PolyHasher};

    const PAYLOAD: usize = 8;

    fn index_with(blocks: usize, hasher: Box<dyn KeyHasher>) -> KeyIndex {
        let region = Region::in_memory(blocks * (META_SIZE + PAYLOAD));
        KeyIndex::open(region, PAYLOAD, hasher).unwrap()
    }

    fn reopen(index: KeyIndex, hasher: Box<dyn KeyHasher>) -> KeyIndex {
        let bytes = index.into_region().to_bytes();
        KeyIndex::open(Region::from_bytes(bytes), PAYLOAD, hasher).unwrap()
    }

    fn put(index: &mut KeyIndex, key: &[u8]) -> BlockId {
        let hash = index.hash(key);
        index.insert(hash, key).unwrap()
    }

    fn find(index: &KeyIndex, key: &[u8]) -> Option<KeyHit> {
        index.lookup(index.hash(key), key)
    }

    #[test]
    fn test_payload_must_exceed_vno() {
        let region = Region::in_memory(10 * (META_SIZE + 4));
        let result = KeyIndex::open(region, 4, Box::new(PolyHasher));
        assert!(matches!(result, Err(BlockKvError::Config(_))));
    }

    #[test]
    fn test_insert_and_lookup_single_block() {
        let mut index = index_with(10, Box::new(PolyHasher));

        let head = put(&mut index, b"abc");
        let hit = find(&index, b"abc").unwrap();

        assert_eq!(hit.head, head);
        assert_eq!(hit.tail, head);
        assert_eq!(hit.pred, None);
        assert_eq!(hit.vno, 0);
        assert_eq!(index.pool().free_count(), 9);
    }

    #[test]
    fn test_multi_block_key() {
        let mut index = index_with(10, Box::new(PolyHasher));
        // 4 + 20 bytes over 8-byte payloads = 3 blocks
        let key: Vec<u8> = (1..=20).collect();

        let head = put(&mut index, &key);
        let hit = find(&index, &key).unwrap();

        assert_eq!(hit.head, head);
        assert_eq!(index.pool().chain_span(head).0, 3);
        assert_eq!(index.read_key(head), Some(key));
        assert_eq!(index.pool().free_count(), 7);
    }

    #[test]
    fn test_write_value_no() {
        let mut index = index_with(10, Box::new(PolyHasher));
        let head = put(&mut index, b"key");

        index.write_value_no(head, 42);

        assert_eq!(find(&index, b"key").unwrap().vno, 42);
        assert_eq!(index.read_key(head), Some(b"key".to_vec()));
    }

    #[test]
    fn test_same_length_different_key_is_not_found() {
        let mut index = index_with(10, Box::new(ConstHasher(1)));
        put(&mut index, b"aaaa");

        assert!(find(&index, b"aaab").is_none());
        assert!(find(&index, b"aaa").is_none());
    }

    #[test]
    fn test_collisions_chain_newest_first() {
        let mut index = index_with(20, Box::new(ConstHasher(9)));
        let a = put(&mut index, b"first-key-long");
        let b = put(&mut index, b"second");
        let c = put(&mut index, b"third-key");

        assert_eq!(index.bucket_count(), 1);
        assert_eq!(find(&index, b"third-key").unwrap().pred, None);
        assert_eq!(find(&index, b"second").unwrap().pred, Some(c + 1));
        assert_eq!(find(&index, b"first-key-long").unwrap().head, a);
        assert_eq!(find(&index, b"second").unwrap().head, b);
    }

    #[test]
    fn test_remove_middle_of_bucket() {
        let mut index = index_with(20, Box::new(ConstHasher(9)));
        put(&mut index, b"first-key-long");
        put(&mut index, b"second");
        put(&mut index, b"third-key");
        let free_before = index.pool().free_count();

        assert!(index.remove(9, b"second"));

        assert!(find(&index, b"second").is_none());
        assert!(find(&index, b"first-key-long").is_some());
        assert!(find(&index, b"third-key").is_some());
        assert_eq!(index.pool().free_count(), free_before + 2);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_remove_bucket_head_and_tail() {
        let mut index = index_with(20, Box::new(ConstHasher(9)));
        put(&mut index, b"one");
        put(&mut index, b"two-two-two");
        put(&mut index, b"three");

        assert!(index.remove(9, b"three"));
        assert!(index.remove(9, b"one"));

        assert_eq!(index.bucket_count(), 1);
        assert!(find(&index, b"two-two-two").is_some());

        assert!(index.remove(9, b"two-two-two"));
        assert_eq!(index.bucket_count(), 0);
        assert!(index.is_empty());
        assert_eq!(index.pool().free_count(), 20);
    }

    #[test]
    fn test_remove_unknown_key() {
        let mut index = index_with(10, Box::new(PolyHasher));
        put(&mut index, b"present");

        assert!(!index.remove(index.hash(b"absent"), b"absent"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_not_enough_blocks() {
        let mut index = index_with(2, Box::new(PolyHasher));
        let key = [7u8; 20];

        let err = index.insert(index.hash(&key), &key).unwrap_err();

        assert!(matches!(err, BlockKvError::NotEnoughSpace { needed: 3, available: 2 }));
        assert_eq!(index.pool().free_count(), 2);
        assert!(index.is_empty());
    }

    #[test]
    fn test_key_too_long() {
        let mut index = index_with(2, Box::new(PolyHasher));
        let key = vec![1u8; index.max_key_len() + 1];

        let err = index.insert(0, &key).unwrap_err();

        assert!(matches!(err, BlockKvError::KeyTooLong { .. }));
    }

    #[test]
    fn test_empty_key_rejected() {
        let mut index = index_with(2, Box::new(PolyHasher));
        assert!(matches!(index.insert(0, b""), Err(BlockKvError::EmptyKey)));
        assert!(index.lookup(0, b"").is_none());
    }

    #[test]
    fn test_reopen_rebuilds_buckets_and_heads() {
        let mut index = index_with(30, Box::new(ConstHasher(5)));
        let long_key: Vec<u8> = (0..30).collect();
        put(&mut index, &long_key);
        let head = put(&mut index, b"short");
        index.write_value_no(head, 17);
        put(&mut index, b"middle-sized");

        let index = reopen(index, Box::new(ConstHasher(5)));

        assert_eq!(index.len(), 3);
        assert_eq!(index.bucket_count(), 1);
        assert!(find(&index, &long_key).is_some());
        assert_eq!(find(&index, b"short").unwrap().vno, 17);
        assert!(find(&index, b"middle-sized").is_some());
    }

    #[test]
    fn test_enumeration_matches_region_scan() {
        let mut index = index_with(30, Box::new(PolyHasher));
        for key in [&b"k1"[..], b"key-number-two", b"k3"] {
            put(&mut index, key);
        }
        index.remove(index.hash(b"k1"), b"k1");

        let mut enumerated: Vec<_> = index
            .head_ids()
            .into_iter()
            .filter_map(|head| index.key_at(head))
            .collect();
        let mut scanned = index.scan_keys();
        enumerated.sort();
        scanned.sort();

        assert_eq!(enumerated, scanned);
        assert_eq!(enumerated, vec![b"k3".to_vec(), b"key-number-two".to_vec()]);
    }

    #[test]
    fn test_key_at_rejects_removed_head() {
        let mut index = index_with(10, Box::new(PolyHasher));
        let head = put(&mut index, b"gone");
        index.remove(index.hash(b"gone"), b"gone");

        assert_eq!(index.key_at(head), None);
    }
}
