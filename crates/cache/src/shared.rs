//! Combined acquisition protocol over the texture cache and in-flight tracker

use std::sync::Arc;

use crate::inflight::{InflightTracker, Join};
use crate::texture::{CacheEntry, CacheKey, Disposable, TextureCache};

/// How an acquisition was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireSource {
    /// The caller already held this key; nothing was retained
    Reused,
    /// An existing entry was retained
    Cached,
    /// Waited on another requester's decode
    Joined,
    /// Ran the decode itself
    Decoded,
}

/// A resource obtained through [`SharedTextures::acquire`]
#[derive(Debug)]
pub struct Acquired<R> {
    pub entry: CacheEntry<R>,
    pub source: AcquireSource,
}

impl<R> Acquired<R> {
    /// Whether this acquisition added a retain the caller must balance
    pub fn is_fresh(&self) -> bool {
        self.source != AcquireSource::Reused
    }
}

type FlightResult<R, E> = Result<CacheEntry<R>, E>;

/// Texture cache plus in-flight tracker behind one acquisition entry point
///
/// Lock order is always in-flight map, then cache. The cache check, the
/// in-flight join and the settle step each run with the in-flight map locked,
/// so no requester can see a key as neither cached nor in flight while its
/// decode is being settled.
///
/// A decode that panics unregisters its key on the way out. Its waiters
/// start over, and the next of them to get there runs the decode again.
pub struct SharedTextures<R, E> {
    cache: Arc<TextureCache<R>>,
    inflight: InflightTracker<FlightResult<R, E>>,
}

impl<R: Disposable, E: Clone> SharedTextures<R, E> {
    pub fn new(cache: Arc<TextureCache<R>>) -> Self {
        Self {
            cache,
            inflight: InflightTracker::new(),
        }
    }

    pub fn cache(&self) -> &Arc<TextureCache<R>> {
        &self.cache
    }

    /// Number of decodes currently outstanding
    pub fn inflight_len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_inflight(&self, key: &CacheKey) -> bool {
        self.inflight.contains(key)
    }

    /// Obtain the entry for `key`, decoding it at most once across callers
    ///
    /// `held` is the key the caller already retains, if any. Unless the result
    /// is [`AcquireSource::Reused`], the caller owns one retain on the returned
    /// entry and must eventually release it.
    ///
    /// Waiters are retained on their own behalf when the owner settles, so a
    /// waiter never finds the entry already gone.
    pub fn acquire<F>(
        &self,
        key: &CacheKey,
        held: Option<&CacheKey>,
        decode: F,
    ) -> Result<Acquired<R>, E>
    where
        F: FnOnce() -> Result<R, E>,
    {
        if held == Some(key) {
            if let Some(entry) = self.cache.get(key) {
                return Ok(Acquired {
                    entry,
                    source: AcquireSource::Reused,
                });
            }
        }

        let owner = loop {
            let mut flights = self.inflight.lock();
            if let Some(entry) = self.cache.retain_if_present(key) {
                log::debug!("texture cache hit {key} ({} holders)", entry.ref_count);
                return Ok(Acquired {
                    entry,
                    source: AcquireSource::Cached,
                });
            }

            match self.inflight.join_locked(&mut flights, key) {
                Join::Waiter(flight) => {
                    drop(flights);
                    log::debug!("waiting on in-flight decode {key}");
                    match flight.wait() {
                        Some(result) => {
                            return result.map(|entry| Acquired {
                                entry,
                                source: AcquireSource::Joined,
                            });
                        }
                        // Owner's decode panicked; start over
                        None => continue,
                    }
                }
                Join::Owner(owner) => break owner,
            }
        };

        self.cache.record_miss();
        log::debug!("texture cache miss {key}, decoding");
        let decoded = decode();

        let result = owner.settle_with(|waiters| {
            decoded.map(|resource| self.cache.insert_retained(key.clone(), resource, waiters))
        });

        result.map(|entry| Acquired {
            entry,
            source: AcquireSource::Decoded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::tests::MockTexture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Barrier};
    use std::thread;
    use std::time::Duration;

    fn key() -> CacheKey {
        CacheKey::new("https://example.com/a.png", 1)
    }

    fn shared() -> Arc<SharedTextures<MockTexture, String>> {
        Arc::new(SharedTextures::new(Arc::new(TextureCache::new())))
    }

    #[test]
    fn test_decode_then_hit() {
        let textures = shared();

        let first = textures
            .acquire(&key(), None, || Ok(MockTexture::new(4, 2)))
            .unwrap();
        assert_eq!(first.source, AcquireSource::Decoded);
        assert_eq!(first.entry.ref_count, 1);

        let second = textures
            .acquire(&key(), None, || Err("should not decode".to_string()))
            .unwrap();
        assert_eq!(second.source, AcquireSource::Cached);
        assert_eq!(textures.cache().ref_count(&key()), 2);
        assert!(Arc::ptr_eq(&first.entry.resource, &second.entry.resource));
    }

    #[test]
    fn test_held_key_is_reused_without_retain() {
        let textures = shared();
        textures
            .acquire(&key(), None, || Ok(MockTexture::new(1, 1)))
            .unwrap();

        let again = textures
            .acquire(&key(), Some(&key()), || Err("should not decode".to_string()))
            .unwrap();
        assert_eq!(again.source, AcquireSource::Reused);
        assert!(!again.is_fresh());
        assert_eq!(textures.cache().ref_count(&key()), 1);
    }

    #[test]
    fn test_failed_decode_leaves_no_entry() {
        let textures = shared();
        let err = textures
            .acquire(&key(), None, || Err("corrupt".to_string()))
            .unwrap_err();

        assert_eq!(err, "corrupt");
        assert!(!textures.cache().has(&key()));
        assert_eq!(textures.inflight_len(), 0);
    }

    #[test]
    fn test_concurrent_requests_share_one_decode() {
        let textures = shared();
        let decodes = Arc::new(AtomicUsize::new(0));
        let (release_tx, release_rx) = mpsc::channel::<()>();

        // Owner blocks inside decode until released
        let owner = {
            let textures = textures.clone();
            let decodes = decodes.clone();
            thread::spawn(move || {
                textures
                    .acquire(&key(), None, || {
                        decodes.fetch_add(1, Ordering::SeqCst);
                        release_rx.recv().unwrap();
                        Ok(MockTexture::new(2, 2))
                    })
                    .unwrap()
            })
        };
        while !textures.is_inflight(&key()) {
            thread::sleep(Duration::from_millis(1));
        }

        let barrier = Arc::new(Barrier::new(4));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let textures = textures.clone();
                let decodes = decodes.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    textures
                        .acquire(&key(), None, || {
                            decodes.fetch_add(1, Ordering::SeqCst);
                            Ok(MockTexture::new(2, 2))
                        })
                        .unwrap()
                })
            })
            .collect();
        barrier.wait();
        thread::sleep(Duration::from_millis(20));
        release_tx.send(()).unwrap();

        let owner = owner.join().unwrap();
        assert_eq!(owner.source, AcquireSource::Decoded);
        for waiter in waiters {
            let waiter = waiter.join().unwrap();
            assert!(waiter.is_fresh());
            assert!(Arc::ptr_eq(&owner.entry.resource, &waiter.entry.resource));
        }

        assert_eq!(decodes.load(Ordering::SeqCst), 1);
        assert_eq!(textures.cache().ref_count(&key()), 4);
        assert_eq!(textures.inflight_len(), 0);
    }

    #[test]
    fn test_waiters_see_owner_failure() {
        let textures = shared();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let owner = {
            let textures = textures.clone();
            thread::spawn(move || {
                textures.acquire(&key(), None, || {
                    release_rx.recv().unwrap();
                    Err("truncated".to_string())
                })
            })
        };
        while !textures.is_inflight(&key()) {
            thread::sleep(Duration::from_millis(1));
        }

        let waiter = {
            let textures = textures.clone();
            thread::spawn(move || {
                textures.acquire(&key(), None, || Ok(MockTexture::new(1, 1)))
            })
        };
        thread::sleep(Duration::from_millis(20));
        release_tx.send(()).unwrap();

        assert_eq!(owner.join().unwrap().unwrap_err(), "truncated");
        let waited = waiter.join().unwrap();
        // Either joined the failed flight or arrived after it settled and decoded anew
        match waited {
            Err(err) => assert_eq!(err, "truncated"),
            Ok(acquired) => assert_eq!(acquired.source, AcquireSource::Decoded),
        }
    }

    #[test]
    fn test_panicking_decode_unregisters_key() {
        let textures = shared();

        let crashed = {
            let textures = textures.clone();
            thread::spawn(move || {
                textures.acquire(&key(), None, || -> Result<MockTexture, String> {
                    panic!("decoder bug")
                })
            })
        };
        assert!(crashed.join().is_err());
        assert_eq!(textures.inflight_len(), 0);
        assert!(!textures.cache().has(&key()));

        let retried = textures
            .acquire(&key(), None, || Ok(MockTexture::new(1, 1)))
            .unwrap();
        assert_eq!(retried.source, AcquireSource::Decoded);
        assert_eq!(textures.cache().ref_count(&key()), 1);
    }

    #[test]
    fn test_waiter_takes_over_after_owner_panics() {
        let textures = shared();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let owner = {
            let textures = textures.clone();
            thread::spawn(move || {
                textures.acquire(&key(), None, || -> Result<MockTexture, String> {
                    release_rx.recv().unwrap();
                    panic!("decoder bug")
                })
            })
        };
        while !textures.is_inflight(&key()) {
            thread::sleep(Duration::from_millis(1));
        }

        let waiter = {
            let textures = textures.clone();
            thread::spawn(move || {
                textures.acquire(&key(), None, || Ok(MockTexture::new(3, 3)))
            })
        };
        thread::sleep(Duration::from_millis(20));
        release_tx.send(()).unwrap();

        assert!(owner.join().is_err());
        let waited = waiter.join().unwrap().unwrap();
        assert_eq!(waited.source, AcquireSource::Decoded);
        assert_eq!(textures.cache().ref_count(&key()), 1);
        assert_eq!(textures.inflight_len(), 0);
    }
}
