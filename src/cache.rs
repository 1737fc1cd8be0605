// Cache module
// LRU cache of extracted covers keyed by track locator, so a track shown twice
// is only fetched and parsed once.

pub use crate::formats::ExtractedCover;

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

/// Thread-safe LRU cache for extracted covers.
/// Clones share the same underlying storage.
#[derive(Clone)]
pub struct CoverCache {
    cache: Arc<RwLock<LruCache<String, ExtractedCover>>>,
}

impl CoverCache {
    /// Create a cache holding up to `capacity` covers (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(RwLock::new(LruCache::new(capacity))),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, LruCache<String, ExtractedCover>> {
        self.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a cover; evicts the least recently used entry when full.
    pub fn insert(&self, locator: impl Into<String>, cover: ExtractedCover) {
        self.write().put(locator.into(), cover);
    }

    /// Get a cover and mark it as recently used. The image bytes are shared, not copied.
    pub fn get(&self, locator: &str) -> Option<ExtractedCover> {
        self.write().get(locator).cloned()
    }

    /// Check presence without touching recency.
    pub fn contains(&self, locator: &str) -> bool {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(locator)
    }

    pub fn remove(&self, locator: &str) -> Option<ExtractedCover> {
        self.write().pop(locator)
    }

    pub fn len(&self) -> usize {
        self.cache.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn capacity(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cap()
            .get()
    }
}

impl Default for CoverCache {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn cover(byte: u8) -> ExtractedCover {
        ExtractedCover {
            bytes: Bytes::from(vec![byte; 4]),
            media_type: "image/png".to_string(),
            picture_type: 3,
        }
    }

    #[test]
    fn test_cache_insert_and_get() {
        let cache = CoverCache::default();
        cache.insert("a.mp3", cover(1));
        assert_eq!(cache.get("a.mp3"), Some(cover(1)));
    }

    #[test]
    fn test_cache_miss() {
        let cache = CoverCache::default();
        assert!(cache.get("missing.mp3").is_none());
    }

    #[test]
    fn test_lru_behavior() {
        let cache = CoverCache::new(2);
        cache.insert("1.mp3", cover(1));
        cache.insert("2.mp3", cover(2));
        cache.get("1.mp3"); // 1 becomes most recent
        cache.insert("3.mp3", cover(3)); // evicts 2

        assert!(cache.contains("1.mp3"));
        assert!(!cache.contains("2.mp3"));
        assert!(cache.contains("3.mp3"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let cache = CoverCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }

    #[test]
    fn test_cache_operations() {
        let cache = CoverCache::default();
        assert!(cache.is_empty());
        cache.insert("a.mp3", cover(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.remove("a.mp3"), Some(cover(1)));
        assert!(cache.is_empty());

        cache.insert("b.mp3", cover(2));
        cache.clear();
        assert!(!cache.contains("b.mp3"));
    }

    #[test]
    fn test_clone_shares_state() {
        let cache = CoverCache::default();
        let other = cache.clone();
        other.insert("shared.mp3", cover(9));
        assert!(cache.contains("shared.mp3"));
    }
}
