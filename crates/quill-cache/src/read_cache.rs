//! LRU read cache over a [`Backing`] store.

use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::SystemTime;

use lru::LruCache;

use crate::backing::{Backing, FsBacking};
use crate::compress::{gzip, should_compress};
use crate::mime::detect_mime;

/// Capacity used when zero is requested (1 MiB).
pub const DEFAULT_CAPACITY: u64 = 1 << 20;

/// Bytes returned by [`ReadCache::read`].
///
/// `data` is shared with the cache entry. The cache never writes into a
/// buffer after it has been handed out; replacing an entry swaps in a new
/// buffer, so a caller's handle stays valid and unchanged.
#[derive(Debug, Clone)]
pub struct CachedRead {
    pub data: Arc<[u8]>,
    pub mime: Arc<str>,
    /// `data` is gzip-encoded.
    pub compressed: bool,
}

#[derive(Debug, Clone)]
struct Entry {
    data: Arc<[u8]>,
    mime: Arc<str>,
    compressed: bool,
    modified: SystemTime,
}

impl Entry {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn to_read(&self) -> CachedRead {
        CachedRead {
            data: Arc::clone(&self.data),
            mime: Arc::clone(&self.mime),
            compressed: self.compressed,
        }
    }
}

struct Inner {
    entries: LruCache<String, Entry>,
    size: u64,
    /// Bumped by every reset. A load that started in an older epoch is
    /// returned to its caller but never admitted.
    epoch: u64,
}

/// Fixed-capacity cache of backing-store bytes with LRU eviction.
///
/// Total resident size never exceeds the capacity. A payload larger than
/// the whole capacity is still returned to the caller but never stored.
pub struct ReadCache<B = FsBacking> {
    backing: B,
    capacity: u64,
    compress: bool,
    inner: Mutex<Inner>,
}

impl ReadCache<FsBacking> {
    /// Cache files under `root`.
    pub fn open(root: impl Into<std::path::PathBuf>, capacity: u64, compress: bool) -> Self {
        Self::new(FsBacking::new(root), capacity, compress)
    }
}

impl<B: Backing> ReadCache<B> {
    /// Create an empty cache.
    ///
    /// # Arguments
    ///
    /// * `backing` - Store misses are loaded from
    /// * `capacity` - Maximum resident bytes; `0` means [`DEFAULT_CAPACITY`]
    /// * `compress` - Gzip entries whose MIME type is compressible
    pub fn new(backing: B, capacity: u64, compress: bool) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        Self {
            backing,
            capacity,
            compress,
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                size: 0,
                epoch: 0,
            }),
        }
    }

    /// Read `key`, from memory when resident and from the backing store
    /// otherwise.
    ///
    /// A hit marks the entry most recently used and does no I/O. A miss
    /// that races a [`reset`](Self::reset) is returned but not cached.
    ///
    /// # Errors
    ///
    /// Returns the backing store's error unchanged, or an error from the
    /// gzip encoder.
    pub fn read(&self, key: &str) -> io::Result<CachedRead> {
        let epoch = {
            let mut inner = self.lock();
            if let Some(entry) = inner.entries.get(key) {
                return Ok(entry.to_read());
            }
            inner.epoch
        };

        let loaded = self.backing.load(key)?;
        let mime = detect_mime(key, &loaded.data);
        let compressed = self.compress && should_compress(&mime);
        let data = if compressed {
            gzip(&loaded.data)?
        } else {
            loaded.data
        };
        let entry = Entry {
            data: data.into(),
            mime: mime.into(),
            compressed,
            modified: loaded.modified,
        };

        if entry.size() > self.capacity {
            tracing::debug!(
                key,
                size = entry.size(),
                capacity = self.capacity,
                "Payload exceeds cache capacity, not caching"
            );
            return Ok(entry.to_read());
        }

        Ok(self.admit(key, entry, epoch))
    }

    /// Insert a freshly loaded entry, resolving races with concurrent loads
    /// of the same key. `epoch` is the reset epoch the load started in.
    fn admit(&self, key: &str, entry: Entry, epoch: u64) -> CachedRead {
        let mut inner = self.lock();

        if inner.epoch != epoch {
            tracing::debug!(key, "Cache reset during load, not caching");
            return entry.to_read();
        }

        if let Some(existing) = inner.entries.get(key)
            && existing.modified >= entry.modified
        {
            return existing.to_read();
        }

        let read = entry.to_read();
        let added = entry.size();
        if let Some(replaced) = inner.entries.put(key.to_owned(), entry) {
            inner.size -= replaced.size();
        }
        inner.size += added;

        while inner.size > self.capacity {
            let Some((evicted, old)) = inner.entries.pop_lru() else {
                break;
            };
            inner.size -= old.size();
            tracing::debug!(key = %evicted, size = old.size(), "Evicted cache entry");
        }

        read
    }

    /// Drop every entry. Loads still in flight are not admitted.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.size = 0;
        inner.epoch = inner.epoch.wrapping_add(1);
    }

    /// Resident bytes.
    pub fn size(&self) -> u64 {
        self.lock().size
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Whether `key` is resident. Does not affect recency.
    pub fn contains(&self, key: &str) -> bool {
        self.lock().entries.contains(key)
    }

    pub fn backing(&self) -> &B {
        &self.backing
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
