use super::AutotuneKey;
use hashbrown::HashMap;

/// In-memory cache entry
#[derive(Debug, Clone)]
struct CacheEntry {
    fastest_index: usize,
}

/// Use to find and reuse the best kernel variant for some input
#[derive(Debug)]
pub struct TuneCache<K> {
    in_memory_cache: HashMap<K, CacheEntry>,
}

/// Result of the cache try
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneCacheResult {
    /// An operation is found.
    Hit {
        /// The index of the fastest operation to execute.
        fastest_index: usize,
    },
    /// No operation is found yet.
    Miss,
}

impl<K: AutotuneKey> Default for TuneCache<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: AutotuneKey> TuneCache<K> {
    /// Create an empty cache.
    pub fn new() -> Self {
        TuneCache {
            in_memory_cache: HashMap::new(),
        }
    }

    /// The fastest index registered for `key`.
    pub fn fastest(&self, key: &K) -> TuneCacheResult {
        match self.in_memory_cache.get(key) {
            Some(val) => TuneCacheResult::Hit {
                fastest_index: val.fastest_index,
            },
            None => TuneCacheResult::Miss,
        }
    }

    /// Register the fastest index for `key`, replacing any previous result.
    pub fn cache_insert(&mut self, key: K, fastest_index: usize) {
        self.in_memory_cache
            .insert(key, CacheEntry { fastest_index });
    }
}
