//! Artwork Texture Cache
//!
//! Reference-counted texture storage with in-flight decode deduplication.
//!
//! [`TextureCache`] owns decoded textures and disposes each one exactly once,
//! when its last holder releases it. [`InflightTracker`] guarantees that at
//! most one decode runs per key. [`SharedTextures`] combines the two into the
//! acquisition protocol display instances go through.

pub mod inflight;
pub mod shared;
pub mod texture;

pub use inflight::{Flight, FlightOwner, InflightTracker, Join};
pub use shared::{AcquireSource, Acquired, SharedTextures};
pub use texture::{
    aspect_ratio, CacheEntry, CacheKey, CacheStats, Disposable, Released, TextureCache,
};

/// Cache consistency violations
///
/// Both are reported to the log and never abort the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("retain of uncached texture {0}")]
    RetainOfUnknownKey(CacheKey),
    #[error("release of uncached texture {0}")]
    ReleaseOfUnknownKey(CacheKey),
}
