//! Store Facade
//!
//! Composes the key index and the value store into a key-value API.
//!
//! ## Responsibilities
//! - Open/create the two backing regions
//! - Resolve keys to value numbers and value numbers to bytes
//! - Keep key chains and value chains consistent across put/remove
//! - Serialize access to the shared block structures

use std::path::Path;

use parking_lot::RwLock;

use crate::block::BlockId;
use crate::config::Config;
use crate::error::{BlockKvError, Result};
use crate::hash::{KeyHasher, PolyHasher};
use crate::region::Region;
use crate::store::{KeyIndex, ValueStore};

/// Block usage of both regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub key_blocks: usize,
    pub key_blocks_free: usize,
    pub value_blocks: usize,
    pub value_blocks_free: usize,
    pub keys: usize,
    pub buckets: usize,
    pub values: usize,
}

struct Inner {
    keys: KeyIndex,
    values: ValueStore,
}

/// Embedded key-value store over a key region and a value region
///
/// ## Concurrency Model: one RwLock over the whole store
///
/// - **Writes** (put/put_if_absent/remove/delete): exclusive lock, so a
///   key chain and its value chain always change together
/// - **Reads** (get/contains/stats and each step of `keys()`): shared lock
///
/// `KvStore` is `Send + Sync`; share it with `Arc`.
pub struct KvStore {
    config: Config,
    inner: RwLock<Inner>,
}

impl KvStore {
    /// Open or create the store described by `config`, hashing keys with
    /// `PolyHasher`.
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with_hasher(config, PolyHasher)
    }

    /// Open or create the store with a caller-supplied key hasher.
    ///
    /// The same hasher must be used on every open of the same files.
    pub fn open_with_hasher(config: Config, hasher: impl KeyHasher + 'static) -> Result<Self> {
        config.validate()?;

        let key_region = Region::open(&config.key_path(), config.key_region_len())?;
        let value_region = Region::open(&config.value_path(), config.value_region_len())?;

        let store = Self::with_regions(key_region, value_region, config, hasher)?;
        tracing::info!(
            data_dir = %store.config.data_dir.display(),
            name = %store.config.name,
            "Opened store"
        );
        Ok(store)
    }

    /// Open `{dir}/{name}.idx` + `{dir}/{name}.dat` with the given layout
    pub fn open_at(
        dir: &Path,
        name: &str,
        key_payload_bytes: usize,
        value_payload_bytes: usize,
        block_count: usize,
    ) -> Result<Self> {
        let config = Config::builder()
            .data_dir(dir)
            .name(name)
            .key_payload_bytes(key_payload_bytes)
            .value_payload_bytes(value_payload_bytes)
            .block_count(block_count)
            .build();
        Self::open(config)
    }

    /// Build a store over already-prepared regions.
    ///
    /// Block counts follow the region lengths; `config` supplies the payload
    /// sizes.
    pub fn with_regions(
        key_region: Region,
        value_region: Region,
        config: Config,
        hasher: impl KeyHasher + 'static,
    ) -> Result<Self> {
        config.validate()?;
        let keys = KeyIndex::open(key_region, config.key_payload_bytes, Box::new(hasher))?;
        let values = ValueStore::open(value_region, config.value_payload_bytes)?;

        Ok(Self {
            config,
            inner: RwLock::new(Inner { keys, values }),
        })
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Store `value` under `key`, overwriting any previous value in place.
    ///
    /// Returns `Ok(false)` when the write is rejected: out of blocks, key or
    /// value too long, or an empty key or value. The store is unchanged in
    /// that case.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.write(key, value, false)
    }

    /// Store `value` only if `key` has no value yet.
    pub fn put_if_absent(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.write(key, value, true)
    }

    fn write(&self, key: &[u8], value: &[u8], only_if_absent: bool) -> Result<bool> {
        if key.is_empty() || value.is_empty() {
            tracing::warn!(key_len = key.len(), value_len = value.len(), "Rejected empty key or value");
            return Ok(false);
        }

        let mut inner = self.inner.write();
        let Inner { keys, values } = &mut *inner;

        let hash = keys.hash(key);
        let hit = keys.lookup(hash, key);

        let (head, existing, fresh_key) = match hit {
            Some(hit) if hit.vno > 0 => {
                if only_if_absent {
                    return Ok(false);
                }
                (hit.head, Some(hit.vno as BlockId), false)
            }
            Some(hit) => (hit.head, None, false),
            None => match keys.insert(hash, key) {
                Ok(head) => (head, None, true),
                Err(e) if e.is_rejection() => {
                    tracing::warn!(key_len = key.len(), error = %e, "Key not stored");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            },
        };

        match values.store(existing, value) {
            Ok(vno) => {
                keys.write_value_no(head, vno);
                Ok(true)
            }
            Err(e) if e.is_rejection() => {
                // A key chain without a value would read as absent forever
                if fresh_key {
                    keys.remove(hash, key);
                }
                tracing::warn!(key_len = key.len(), value_len = value.len(), error = %e, "Value not stored");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove `key`, returning its value.
    ///
    /// A key whose value chain is missing is reported as
    /// `BlockKvError::Corruption` after the key itself has been removed.
    pub fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.write();
        let Inner { keys, values } = &mut *inner;

        let hash = keys.hash(key);
        let Some(hit) = keys.lookup(hash, key) else {
            return Ok(None);
        };
        if !keys.remove(hash, key) {
            return Ok(None);
        }
        if hit.vno <= 0 {
            return Ok(None);
        }

        match values.take(hit.vno) {
            Some(value) => Ok(Some(value)),
            None => {
                tracing::error!(key = ?key, vno = hit.vno, "Key removed but its value chain is missing");
                Err(BlockKvError::Corruption(format!(
                    "key resolved to value {} with no value chain",
                    hit.vno
                )))
            }
        }
    }

    /// Remove `key` without reading its value back.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        let mut inner = self.inner.write();
        let Inner { keys, values } = &mut *inner;

        let hash = keys.hash(key);
        let Some(hit) = keys.lookup(hash, key) else {
            return Ok(false);
        };
        keys.remove(hash, key);
        if hit.vno > 0 && !values.delete(hit.vno) {
            tracing::error!(key = ?key, vno = hit.vno, "Key removed but its value chain is missing");
            return Err(BlockKvError::Corruption(format!(
                "key resolved to value {} with no value chain",
                hit.vno
            )));
        }
        Ok(true)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let inner = self.inner.read();

        let hash = inner.keys.hash(key);
        let Some(hit) = inner.keys.lookup(hash, key) else {
            return Ok(None);
        };
        if hit.vno <= 0 {
            return Ok(None);
        }

        match inner.values.read(hit.vno) {
            Some(value) => Ok(Some(value)),
            None => {
                tracing::error!(key = ?key, vno = hit.vno, "Key points at a missing value chain");
                Err(BlockKvError::Corruption(format!(
                    "key resolved to value {} with no value chain",
                    hit.vno
                )))
            }
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let inner = self.inner.read();
        let hash = inner.keys.hash(key);
        inner
            .keys
            .lookup(hash, key)
            .is_some_and(|hit| inner.values.contains(hit.vno))
    }

    /// Iterate over the stored keys.
    ///
    /// The set of key heads is captured when the iterator is created; each
    /// step then reads one key under the shared lock. Keys removed after the
    /// snapshot are skipped.
    pub fn keys(&self) -> Keys<'_> {
        let heads = self.inner.read().keys.head_ids();
        Keys {
            store: self,
            heads: heads.into_iter(),
        }
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.inner.read().keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> StoreStats {
        let inner = self.inner.read();
        StoreStats {
            key_blocks: inner.keys.pool().block_count(),
            key_blocks_free: inner.keys.pool().free_count(),
            value_blocks: inner.values.pool().block_count(),
            value_blocks_free: inner.values.pool().free_count(),
            keys: inner.keys.len(),
            buckets: inner.keys.bucket_count(),
            values: inner.values.len(),
        }
    }

    /// Log every bucket chain and value chain
    pub fn dump(&self) {
        let inner = self.inner.read();
        tracing::info!("---- key index ----");
        inner.keys.dump();
        tracing::info!("---- value store ----");
        inner.values.dump();
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Write dirty pages of both regions back to their files
    pub fn flush(&self) -> Result<()> {
        let inner = self.inner.read();
        inner.keys.flush()?;
        inner.values.flush()
    }

    /// Close the store, flushing first if configured to
    pub fn close(self) -> Result<()> {
        if self.config.flush_on_close {
            self.flush()?;
        }
        tracing::info!(name = %self.config.name, "Closed store");
        Ok(())
    }

    /// Tear the store down and hand back `(key_region, value_region)`
    pub fn into_regions(self) -> (Region, Region) {
        let inner = self.inner.into_inner();
        (inner.keys.into_region(), inner.values.into_region())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Iterator over the keys of a `KvStore`, see `KvStore::keys`
pub struct Keys<'a> {
    store: &'a KvStore,
    heads: std::vec::IntoIter<BlockId>,
}

impl Iterator for Keys<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        for head in self.heads.by_ref() {
            let inner = self.store.inner.read();
            if let Some(key) = inner.keys.key_at(head) {
                return Some(key);
            }
        }
        None
    }
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
