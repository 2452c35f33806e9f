//! Bounded LRU cache over keyed byte buffers.
//!
//! Blocks are tens of megabytes each and the transforms revisit their
//! neighbours, so reads go through a byte-capacity-bounded LRU keyed by
//! section or block. Single-task: the engine processes one subfile
//! sequentially, so there is no locking.

use std::collections::{HashMap, VecDeque};
use std::fmt;

use bytes::Bytes;
use tracing::trace;

use crate::metadata::Section;

/// Cache key: a named section or a data block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    Section(Section),
    Block(u32),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::Section(s) => write!(f, "{}", s.name()),
            CacheKey::Block(n) => write!(f, "block-{n}"),
        }
    }
}

/// Counters kept for observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub deletes: u64,
    pub flushes: u64,
    pub bytes_retained: u64,
    pub bytes_released: u64,
}

/// Bounded LRU mapping cache keys to immutable byte buffers.
///
/// `add` rejects buffers larger than the whole capacity and otherwise evicts
/// from the LRU tail until the new entry fits. Keys compare by value; adding
/// under an existing key replaces the previous buffer.
#[derive(Debug)]
pub struct BlockCache {
    capacity: u64,
    used: u64,
    entries: HashMap<CacheKey, Bytes>,
    /// Recency order, most recently used at the front.
    recency: VecDeque<CacheKey>,
    stats: CacheStats,
}

impl BlockCache {
    /// Default capacity, sized to hold several data blocks at once.
    pub const DEFAULT_CAPACITY: u64 = 1 << 30;

    /// Capacity used by the bake command, which walks every block in
    /// source order and would otherwise thrash a smaller cache.
    pub const BAKE_CAPACITY: u64 = 6 << 30;

    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            used: 0,
            entries: HashMap::new(),
            recency: VecDeque::new(),
            stats: CacheStats::default(),
        }
    }

    /// Insert a buffer, evicting from the LRU tail to make room.
    ///
    /// Returns false (and caches nothing) when the buffer alone exceeds the
    /// capacity.
    pub fn add(&mut self, key: CacheKey, buf: Bytes) -> bool {
        let size = buf.len() as u64;
        if size > self.capacity {
            trace!(%key, size, capacity = self.capacity, "buffer exceeds cache capacity");
            return false;
        }

        if self.entries.contains_key(&key) {
            self.remove(&key);
        }

        while self.used + size > self.capacity {
            let Some(tail) = self.recency.back().copied() else {
                break;
            };
            trace!(key = %tail, "evicting");
            self.remove(&tail);
        }

        self.used += size;
        self.stats.inserts += 1;
        self.stats.bytes_retained += size;
        self.entries.insert(key, buf);
        self.recency.push_front(key);
        true
    }

    /// Look up a buffer, refreshing its recency on a hit.
    pub fn get(&mut self, key: &CacheKey) -> Option<Bytes> {
        match self.entries.get(key) {
            Some(buf) => {
                self.stats.hits += 1;
                self.recency.retain(|k| k != key);
                self.recency.push_front(*key);
                Some(buf.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Drop every entry.
    pub fn flush(&mut self) {
        self.stats.flushes += 1;
        self.stats.deletes += self.entries.len() as u64;
        self.stats.bytes_released += self.used;
        self.entries.clear();
        self.recency.clear();
        self.used = 0;
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(old) = self.entries.remove(key) {
            self.used -= old.len() as u64;
            self.stats.deletes += 1;
            self.stats.bytes_released += old.len() as u64;
            self.recency.retain(|k| k != key);
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }
}
