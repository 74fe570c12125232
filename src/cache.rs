use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use crate::directory::{DirEntry, Directory};
use crate::tile::TileId;

/// Result of a directory cache lookup.
pub enum DirCacheResult {
    /// The directory was not found in the cache.
    NotCached,
    /// The tile was not found in the directory.
    NotFound,
    /// The tile was found in the directory.
    Found(DirEntry),
}

impl From<Option<&DirEntry>> for DirCacheResult {
    fn from(entry: Option<&DirEntry>) -> Self {
        match entry {
            Some(entry) => DirCacheResult::Found(entry.clone()),
            None => DirCacheResult::NotFound,
        }
    }
}

/// A cache for leaf directories, keyed by their absolute offset.
///
/// The reader keeps the parsed root directory itself; only leaf directories
/// pass through this trait.
pub trait DirectoryCache {
    /// Get a directory from the cache, and the entry for `tile_id` within it.
    fn get_dir_entry(
        &self,
        offset: u64,
        tile_id: TileId,
    ) -> impl Future<Output = DirCacheResult> + Send;

    /// Insert a directory into the cache, using the offset as a key.
    /// Note that the cache must be internally mutable.
    fn insert_dir(&self, offset: u64, directory: Directory) -> impl Future<Output = ()> + Send;
}

/// A cache that does not cache anything.
pub struct NoCache;

impl DirectoryCache for NoCache {
    #[inline]
    async fn get_dir_entry(&self, _offset: u64, _tile_id: TileId) -> DirCacheResult {
        DirCacheResult::NotCached
    }

    #[inline]
    async fn insert_dir(&self, _offset: u64, _directory: Directory) {}
}

/// A bounded, internally synchronized least-recently-used directory cache.
///
/// A decompressed leaf directory is usually well under 16 KiB, so the default
/// capacity of 64 leaves keeps a busy reader around a megabyte of cache.
pub struct LruDirCache {
    cache: Mutex<lru::LruCache<u64, Directory>>,
}

impl LruDirCache {
    /// Creates a cache holding up to `capacity` leaf directories.
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            cache: Mutex::new(lru::LruCache::new(capacity)),
        }
    }
}

impl Default for LruDirCache {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(64).expect("64 is non-zero"))
    }
}

impl DirectoryCache for LruDirCache {
    async fn get_dir_entry(&self, offset: u64, tile_id: TileId) -> DirCacheResult {
        // A poisoned lock is not something the user can handle
        #[expect(clippy::unwrap_used)]
        let mut cache = self.cache.lock().unwrap();
        match cache.get(&offset) {
            Some(directory) => directory.find_tile_id(tile_id).into(),
            None => DirCacheResult::NotCached,
        }
    }

    async fn insert_dir(&self, offset: u64, directory: Directory) {
        // A poisoned lock is not something the user can handle
        #[expect(clippy::unwrap_used)]
        self.cache.lock().unwrap().push(offset, directory);
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::{DirCacheResult, DirectoryCache, LruDirCache, NoCache};
    use crate::directory::{DirEntry, Directory};
    use crate::TileId;

    fn directory_with_tile(tile_id: u64) -> Directory {
        Directory::from_entries(vec![DirEntry {
            tile_id,
            offset: 0,
            length: 42,
            run_length: 1,
        }])
    }

    #[tokio::test]
    async fn no_cache_never_caches() {
        let cache = NoCache;
        cache.insert_dir(0, directory_with_tile(0)).await;
        assert!(matches!(
            cache.get_dir_entry(0, TileId::new(0).unwrap()).await,
            DirCacheResult::NotCached
        ));
    }

    #[tokio::test]
    async fn lru_hit_miss_and_not_found() {
        let cache = LruDirCache::default();
        let tile_id = TileId::new(7).unwrap();

        assert!(matches!(
            cache.get_dir_entry(100, tile_id).await,
            DirCacheResult::NotCached
        ));

        cache.insert_dir(100, directory_with_tile(7)).await;
        assert!(matches!(
            cache.get_dir_entry(100, tile_id).await,
            DirCacheResult::Found(_)
        ));

        // Cached directory that does not contain the tile.
        assert!(matches!(
            cache.get_dir_entry(100, TileId::new(9).unwrap()).await,
            DirCacheResult::NotFound
        ));
    }

    #[tokio::test]
    async fn lru_evicts_least_recently_used() {
        let cache = LruDirCache::new(NonZeroUsize::new(2).unwrap());
        let tile_id = TileId::new(0).unwrap();

        cache.insert_dir(1, directory_with_tile(0)).await;
        cache.insert_dir(2, directory_with_tile(0)).await;

        // Touch 1 so that 2 becomes the eviction candidate.
        assert!(matches!(
            cache.get_dir_entry(1, tile_id).await,
            DirCacheResult::Found(_)
        ));
        cache.insert_dir(3, directory_with_tile(0)).await;

        assert!(matches!(
            cache.get_dir_entry(2, tile_id).await,
            DirCacheResult::NotCached
        ));
        assert!(matches!(
            cache.get_dir_entry(1, tile_id).await,
            DirCacheResult::Found(_)
        ));
        assert!(matches!(
            cache.get_dir_entry(3, tile_id).await,
            DirCacheResult::Found(_)
        ));
    }
}
