use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::model::GlossDto;

/// Thread-safe LRU cache of remote gloss records
///
/// Lets the situations of one sync run that share glosses skip the network.
/// Bounded by entry count; the sync client clears it at the start of each run.
pub struct RecordCache {
    cache: Mutex<LruCache<String, GlossDto>>,
}

impl RecordCache {
    /// Create a cache holding up to `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(cap)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, GlossDto>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached record for `id`, refreshing its recency.
    pub fn get(&self, id: &str) -> Option<GlossDto> {
        self.lock().get(id).cloned()
    }

    pub fn put(&self, record: GlossDto) {
        self.lock().put(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}
