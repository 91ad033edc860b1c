//! Reference-counted texture cache
//!
//! Maps a resolved URL and version to a decoded texture that is shared by every
//! display instance showing it. An entry lives exactly as long as at least one
//! holder has retained it; the release that brings the count to zero disposes
//! the texture and removes the entry.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::CacheError;

/// Identifies one decoded texture instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Resolved, directly fetchable URL
    pub url: String,

    /// Requested media version
    pub version: u32,
}

impl CacheKey {
    pub fn new(url: impl Into<String>, version: u32) -> Self {
        Self {
            url: url.into(),
            version,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.url, self.version)
    }
}

/// A decoded resource the cache can hold and dispose of.
///
/// Implementations release whatever the resource owns (streaming handles,
/// pixel buffers, GPU-side allocations) in [`Disposable::dispose`]. The cache
/// calls it at most once per entry.
pub trait Disposable: Send + Sync {
    /// Intrinsic size in pixels as `(width, height)`
    fn dimensions(&self) -> (u32, u32);

    /// Release the underlying media and buffers
    fn dispose(&self);
}

/// Height-over-width ratio of a resource, 1.0 for degenerate sizes.
pub fn aspect_ratio((width, height): (u32, u32)) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        height as f32 / width as f32
    }
}

/// Snapshot of a cache entry
///
/// The resource is shared; `ref_count` is the count at the moment the snapshot
/// was taken.
#[derive(Debug)]
pub struct CacheEntry<R> {
    pub key: CacheKey,
    pub resource: Arc<R>,
    pub aspect_ratio: f32,
    pub ref_count: usize,
}

impl<R> Clone for CacheEntry<R> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            resource: Arc::clone(&self.resource),
            aspect_ratio: self.aspect_ratio,
            ref_count: self.ref_count,
        }
    }
}

/// Outcome of a successful release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Released {
    /// Other holders remain
    Retained { remaining: usize },
    /// The last holder let go; the resource was disposed and removed
    Disposed,
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently in the cache
    pub entry_count: usize,

    /// Acquisitions served from an existing entry
    pub hits: u64,

    /// Acquisitions that had to start a decode
    pub misses: u64,

    /// Entries created from freshly decoded resources
    pub inserts: u64,

    /// Resources disposed after their last release
    pub disposals: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct Slot<R> {
    resource: Arc<R>,
    aspect_ratio: f32,
    ref_count: usize,
}

impl<R> Slot<R> {
    fn snapshot(&self, key: &CacheKey) -> CacheEntry<R> {
        CacheEntry {
            key: key.clone(),
            resource: Arc::clone(&self.resource),
            aspect_ratio: self.aspect_ratio,
            ref_count: self.ref_count,
        }
    }
}

struct CacheState<R> {
    entries: HashMap<CacheKey, Slot<R>>,
    stats: CacheStats,
}

impl<R> CacheState<R> {
    fn sync_count(&mut self) {
        self.stats.entry_count = self.entries.len();
    }
}

/// Reference-counted store of decoded textures
///
/// Thread-safe; every operation is a single atomic step under the cache lock.
/// Disposal runs on the releasing thread right after the entry is removed.
///
/// # Example
///
/// ```
/// use artwork_cache::{CacheKey, Disposable, TextureCache};
///
/// struct Pixels;
///
/// impl Disposable for Pixels {
///     fn dimensions(&self) -> (u32, u32) {
///         (200, 100)
///     }
///     fn dispose(&self) {}
/// }
///
/// let cache = TextureCache::new();
/// let key = CacheKey::new("https://example.com/a.png", 1);
///
/// let entry = cache.set(key.clone(), Pixels);
/// assert_eq!(entry.ref_count, 1);
/// assert_eq!(entry.aspect_ratio, 0.5);
///
/// cache.retain(&key).unwrap();
/// cache.release(&key).unwrap();
/// cache.release(&key).unwrap();
/// assert!(!cache.has(&key));
/// ```
pub struct TextureCache<R> {
    state: Mutex<CacheState<R>>,
}

impl<R: Disposable> TextureCache<R> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                stats: CacheStats::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check if an entry exists for `key`
    pub fn has(&self, key: &CacheKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    /// Snapshot the entry for `key` without touching its count
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry<R>> {
        self.lock().entries.get(key).map(|slot| slot.snapshot(key))
    }

    /// Register a freshly decoded resource
    ///
    /// The entry starts with one holder: the caller. If an entry for `key`
    /// already exists the incoming resource is disposed and the existing entry
    /// is retained instead, so existing holders are never orphaned.
    pub fn set(&self, key: CacheKey, resource: R) -> CacheEntry<R> {
        self.insert_retained(key, resource, 0)
    }

    /// Increment the count of an existing entry
    ///
    /// Retaining an absent key is logged and otherwise a no-op.
    pub fn retain(&self, key: &CacheKey) -> Result<CacheEntry<R>, CacheError> {
        let mut state = self.lock();
        match state.entries.get_mut(key) {
            Some(slot) => {
                slot.ref_count += 1;
                log::trace!("retain {key} -> {}", slot.ref_count);
                Ok(slot.snapshot(key))
            }
            None => {
                log::error!("Retaining uncached texture {key}");
                Err(CacheError::RetainOfUnknownKey(key.clone()))
            }
        }
    }

    /// Decrement the count of an entry, disposing it when no holders remain
    ///
    /// Releasing an absent key (including one already disposed) is logged and
    /// returns an error; it never panics.
    pub fn release(&self, key: &CacheKey) -> Result<Released, CacheError> {
        let disposed = {
            let mut state = self.lock();
            let Some(slot) = state.entries.get_mut(key) else {
                log::error!("Releasing uncached texture {key}");
                return Err(CacheError::ReleaseOfUnknownKey(key.clone()));
            };

            slot.ref_count = slot.ref_count.saturating_sub(1);
            log::trace!("release {key} -> {}", slot.ref_count);
            if slot.ref_count > 0 {
                return Ok(Released::Retained {
                    remaining: slot.ref_count,
                });
            }

            let slot = state.entries.remove(key);
            state.stats.disposals += 1;
            state.sync_count();
            slot
        };

        if let Some(slot) = disposed {
            log::debug!("disposing texture {key}");
            slot.resource.dispose();
        }
        Ok(Released::Disposed)
    }

    /// Current count for `key`, zero when absent
    pub fn ref_count(&self, key: &CacheKey) -> usize {
        self.lock().entries.get(key).map_or(0, |slot| slot.ref_count)
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Keys of all live entries
    pub fn keys(&self) -> Vec<CacheKey> {
        self.lock().entries.keys().cloned().collect()
    }

    /// Shared handles to every live resource
    pub fn resources(&self) -> Vec<Arc<R>> {
        self.lock()
            .entries
            .values()
            .map(|slot| Arc::clone(&slot.resource))
            .collect()
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }

    /// Retain `key` if present, counting the lookup as a hit
    pub(crate) fn retain_if_present(&self, key: &CacheKey) -> Option<CacheEntry<R>> {
        let mut state = self.lock();
        let entry = state.entries.get_mut(key).map(|slot| {
            slot.ref_count += 1;
            slot.snapshot(key)
        });
        if entry.is_some() {
            state.stats.hits += 1;
        }
        entry
    }

    pub(crate) fn record_miss(&self) {
        self.lock().stats.misses += 1;
    }

    /// Insert `resource` with `1 + extra_holders` holders in one step
    pub(crate) fn insert_retained(
        &self,
        key: CacheKey,
        resource: R,
        extra_holders: usize,
    ) -> CacheEntry<R> {
        let holders = 1 + extra_holders;
        let mut state = self.lock();

        if let Some(slot) = state.entries.get_mut(&key) {
            slot.ref_count += holders;
            let entry = slot.snapshot(&key);
            drop(state);
            log::warn!("texture {key} was already cached; disposing duplicate");
            resource.dispose();
            return entry;
        }

        let slot = Slot {
            aspect_ratio: aspect_ratio(resource.dimensions()),
            resource: Arc::new(resource),
            ref_count: holders,
        };
        let entry = slot.snapshot(&key);
        state.entries.insert(key, slot);
        state.stats.inserts += 1;
        state.sync_count();
        entry
    }
}

impl<R: Disposable> Default for TextureCache<R> {
    fn default() -> Self {
        Self::new()
    }
}
