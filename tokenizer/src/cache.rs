//! Thread-safe memo of merge results, keyed by piece bytes.
//!
//! The cache never changes what `encode` returns; it only skips repeated
//! merges of pieces that were seen before. It is bounded: once `capacity`
//! entries are stored the whole map is cleared.

use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::ranks::Rank;

/// Pieces longer than this are never cached.
pub const MAX_CACHED_PIECE_LEN: usize = 256;

#[derive(Debug)]
pub struct MergeCache {
    capacity: usize,
    entries: Mutex<HashMap<Vec<u8>, Vec<Rank>>>,
}

impl MergeCache {
    /// A cache holding at most `capacity` pieces. Zero disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Vec<u8>, Vec<Rank>>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cached tokens for `piece`, or compute them with `merge` and remember
    /// the result.
    pub fn get_or_insert_with<F>(&self, piece: &[u8], merge: F) -> Vec<Rank>
    where
        F: FnOnce(&[u8]) -> Vec<Rank>,
    {
        if !self.is_enabled() || piece.len() > MAX_CACHED_PIECE_LEN {
            return merge(piece);
        }

        if let Some(tokens) = self.lock().get(piece) {
            return tokens.clone();
        }

        // Merge outside the lock; a racing thread computes the same value.
        let tokens = merge(piece);

        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            debug!("Merge cache full ({} pieces), clearing", entries.len());
            entries.clear();
        }
        entries.insert(piece.to_vec(), tokens.clone());
        tokens
    }

    /// Number of cached pieces.
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_second_lookup_hits() {
        let cache = MergeCache::new(8);
        let calls = Cell::new(0);
        let merge = |p: &[u8]| {
            calls.set(calls.get() + 1);
            vec![p.len() as Rank]
        };

        assert_eq!(cache.get_or_insert_with(b"abc", merge), vec![3]);
        assert_eq!(cache.get_or_insert_with(b"abc", merge), vec![3]);
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_disabled_cache_stores_nothing() {
        let cache = MergeCache::new(0);
        assert!(!cache.is_enabled());
        cache.get_or_insert_with(b"abc", |_| vec![1]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_full_cache_is_cleared() {
        let cache = MergeCache::new(2);
        cache.get_or_insert_with(b"a", |_| vec![1]);
        cache.get_or_insert_with(b"b", |_| vec![2]);
        assert_eq!(cache.len(), 2);
        cache.get_or_insert_with(b"c", |_| vec![3]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_long_pieces_bypass_cache() {
        let cache = MergeCache::new(8);
        let piece = vec![b'x'; MAX_CACHED_PIECE_LEN + 1];
        cache.get_or_insert_with(&piece, |_| vec![0]);
        assert!(cache.is_empty());
    }
}
