//! Per-instance load state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use artwork_cache::CacheKey;

use crate::host::DisplayHost;

/// Where a display instance is in its load cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    /// Nothing requested yet, or an empty source with nothing bound
    Idle,
    Resolving,
    Decoding,
    /// Showing the cached texture for this key
    Bound(CacheKey),
    /// Showing the error placeholder
    Error,
    /// Detached; terminal
    Removed,
}

#[derive(Debug)]
pub(crate) struct BindingState {
    pub(crate) phase: LoadPhase,
    /// Key this binding holds one retain on
    pub(crate) retained_key: Option<CacheKey>,
    /// Bumped by every update and by detach; a load whose generation no
    /// longer matches is stale
    pub(crate) generation: u64,
}

impl BindingState {
    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.phase != LoadPhase::Removed
    }
}

/// One on-screen artwork instance
///
/// Created by [`crate::ArtworkLoader::attach`]. The retained key is only ever
/// changed by the loader, through the cache's retain/release protocol.
pub struct DisplayBinding {
    id: u64,
    host: Arc<dyn DisplayHost>,
    state: Mutex<BindingState>,
}

impl DisplayBinding {
    pub(crate) fn new(id: u64, host: Arc<dyn DisplayHost>) -> Self {
        Self {
            id,
            host,
            state: Mutex::new(BindingState {
                phase: LoadPhase::Idle,
                retained_key: None,
                generation: 0,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn host(&self) -> &Arc<dyn DisplayHost> {
        &self.host
    }

    pub fn phase(&self) -> LoadPhase {
        self.lock().phase.clone()
    }

    /// Key of the cache entry this binding keeps alive, if any
    pub fn retained_key(&self) -> Option<CacheKey> {
        self.lock().retained_key.clone()
    }

    pub fn is_removed(&self) -> bool {
        self.lock().phase == LoadPhase::Removed
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, BindingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for DisplayBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("DisplayBinding")
            .field("id", &self.id)
            .field("phase", &state.phase)
            .field("retained_key", &state.retained_key)
            .finish()
    }
}
