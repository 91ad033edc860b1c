//! Artwork load orchestration.
//!
//! Drives each [`DisplayBinding`] through resolve, content type negotiation
//! and decode, and keeps its single cache retain balanced across source
//! changes, failures and detachment.
//!
//! Loads are never cancelled. A load that finishes after its binding was
//! detached or given a newer source releases whatever it acquired instead of
//! binding it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use artwork_cache::{Acquired, CacheKey, SharedTextures, TextureCache};
use artwork_media::{
    ContentTypeResolver, DecodePipeline, MediaError, ResolveRequest, Texture, UrlResolver,
};

use crate::binding::{DisplayBinding, LoadPhase};
use crate::error::ArtworkError;
use crate::host::{ArtworkEvent, DisplayHost};

/// Shared texture store used by every loader in a process
pub type SharedTextureStore = SharedTextures<Texture, MediaError>;

/// What a display instance should show
#[derive(Debug, Clone, PartialEq)]
pub struct ArtworkSource {
    pub src: String,
    /// Explicit content type; skips guessing and probing
    pub content_type: Option<String>,
    pub version: u32,
    /// Run the source through the media resolution service
    pub resolve: bool,
    /// Projection tag, `360-equirectangular` selects 360° renditions
    pub projection: Option<String>,
    /// Width of the display surface; height follows the aspect ratio
    pub display_width: f32,
}

impl ArtworkSource {
    pub fn new(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            content_type: None,
            version: 1,
            resolve: false,
            projection: None,
            display_width: 1.0,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }

    pub fn with_resolve(mut self, resolve: bool) -> Self {
        self.resolve = resolve;
        self
    }

    pub fn with_projection(mut self, projection: impl Into<String>) -> Self {
        self.projection = Some(projection.into());
        self
    }

    pub fn with_display_width(mut self, width: f32) -> Self {
        self.display_width = width;
        self
    }
}

/// Result of [`ArtworkLoader::update`]
#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome {
    /// Empty source; nothing was loaded
    Unchanged,
    /// The texture for this key is now visible
    Bound(CacheKey),
    /// The load failed and the error placeholder is visible
    Failed(ArtworkError),
    /// The binding moved on before the load finished; its result was released
    Discarded,
}

/// Loads artwork for display bindings through a shared texture store
pub struct ArtworkLoader {
    textures: Arc<SharedTextureStore>,
    urls: UrlResolver,
    content_types: ContentTypeResolver,
    pipeline: DecodePipeline,
    placeholder: Arc<Texture>,
    next_id: AtomicU64,
}

impl ArtworkLoader {
    pub fn new(
        textures: Arc<SharedTextureStore>,
        urls: UrlResolver,
        content_types: ContentTypeResolver,
        pipeline: DecodePipeline,
    ) -> Self {
        Self {
            textures,
            urls,
            content_types,
            pipeline,
            placeholder: Arc::new(Texture::placeholder()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Replace the texture shown when a load fails
    pub fn with_placeholder(mut self, placeholder: Texture) -> Self {
        self.placeholder = Arc::new(placeholder);
        self
    }

    pub fn cache(&self) -> &Arc<TextureCache<Texture>> {
        self.textures.cache()
    }

    pub fn textures(&self) -> &Arc<SharedTextureStore> {
        &self.textures
    }

    pub fn placeholder(&self) -> &Arc<Texture> {
        &self.placeholder
    }

    /// Create a binding for a newly attached display entity
    pub fn attach(&self, host: Arc<dyn DisplayHost>) -> Arc<DisplayBinding> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        log::debug!("attached display binding {id}");
        Arc::new(DisplayBinding::new(id, host))
    }

    /// Load `source` into `binding`, blocking until it is bound or has failed
    ///
    /// The previously bound key is released only once the new one is bound
    /// or the load has failed.
    pub fn update(
        &self,
        binding: &DisplayBinding,
        source: &ArtworkSource,
    ) -> Result<LoadOutcome, ArtworkError> {
        if !source.display_width.is_finite() || source.display_width <= 0.0 {
            return Err(ArtworkError::InvalidSource(format!(
                "display width {} for {}",
                source.display_width, source.src
            )));
        }

        let (generation, held) = {
            let mut state = binding.lock();
            if state.phase == LoadPhase::Removed {
                return Err(ArtworkError::Detached(binding.id()));
            }
            if source.src.trim().is_empty() {
                if state.retained_key.is_none() {
                    state.phase = LoadPhase::Idle;
                }
                return Ok(LoadOutcome::Unchanged);
            }
            state.generation += 1;
            state.phase = LoadPhase::Resolving;
            (state.generation, state.retained_key.clone())
        };

        match self.load(binding, generation, held.as_ref(), source) {
            Ok(Some(acquired)) => Ok(self.commit(binding, generation, acquired, source)),
            Ok(None) => Ok(LoadOutcome::Discarded),
            Err(err) => Ok(self.fail(binding, generation, err, source)),
        }
    }

    /// Resolve, negotiate and acquire; `None` when the binding moved on
    /// before decoding started
    fn load(
        &self,
        binding: &DisplayBinding,
        generation: u64,
        held: Option<&CacheKey>,
        source: &ArtworkSource,
    ) -> Result<Option<Acquired<Texture>>, MediaError> {
        let resolved = self.urls.resolve(&ResolveRequest {
            src: &source.src,
            version: source.version,
            resolve: source.resolve,
            projection: source.projection.as_deref(),
        })?;

        let hint = source
            .content_type
            .as_deref()
            .or(resolved.content_type_hint.as_deref());
        let content_type = self.content_types.resolve_type_with_probe(
            &resolved.canonical_url,
            &resolved.resolved_url,
            hint,
        )?;

        let key = CacheKey::new(resolved.resolved_url.clone(), source.version);
        {
            let mut state = binding.lock();
            if !state.is_current(generation) {
                return Ok(None);
            }
            state.phase = LoadPhase::Decoding;
        }
        binding.host().emit(ArtworkEvent::ImageLoading {
            src: source.src.clone(),
        });

        let url = resolved.resolved_url;
        self.textures
            .acquire(&key, held, || self.pipeline.decode(&url, &content_type))
            .map(Some)
    }

    fn commit(
        &self,
        binding: &DisplayBinding,
        generation: u64,
        acquired: Acquired<Texture>,
        source: &ArtworkSource,
    ) -> LoadOutcome {
        let key = acquired.entry.key.clone();
        let previous = {
            let mut state = binding.lock();
            if !state.is_current(generation) {
                drop(state);
                if acquired.is_fresh() {
                    log::warn!(
                        "display binding {} moved on while loading {key}, releasing",
                        binding.id()
                    );
                    self.release(&key);
                }
                return LoadOutcome::Discarded;
            }
            state.phase = LoadPhase::Bound(key.clone());
            if acquired.is_fresh() {
                state.retained_key.replace(key.clone())
            } else {
                None
            }
        };

        // Also balances a fresh retain on the key this binding already held
        if let Some(previous) = previous {
            self.release(&previous);
        }

        self.show(
            binding,
            acquired.entry.resource,
            acquired.entry.aspect_ratio,
            source,
        );
        log::debug!("display binding {} bound to {key}", binding.id());
        LoadOutcome::Bound(key)
    }

    fn fail(
        &self,
        binding: &DisplayBinding,
        generation: u64,
        err: MediaError,
        source: &ArtworkSource,
    ) -> LoadOutcome {
        let previous = {
            let mut state = binding.lock();
            if !state.is_current(generation) {
                log::warn!(
                    "display binding {} moved on before {} failed: {err}",
                    binding.id(),
                    source.src
                );
                return LoadOutcome::Discarded;
            }
            state.phase = LoadPhase::Error;
            state.retained_key.take()
        };
        log::error!("failed to load artwork {}: {err}", source.src);

        if let Some(previous) = previous {
            self.release(&previous);
        }
        // The error state is always square, whatever the placeholder's size
        self.show(binding, self.placeholder.clone(), 1.0, source);
        LoadOutcome::Failed(ArtworkError::Media(err))
    }

    fn show(
        &self,
        binding: &DisplayBinding,
        texture: Arc<Texture>,
        ratio: f32,
        source: &ArtworkSource,
    ) {
        let host = binding.host();
        host.set_visual_resource(texture);
        host.set_scale(source.display_width, source.display_width * ratio);
        host.emit(ArtworkEvent::ImageLoaded {
            src: source.src.clone(),
            projection: source.projection.clone(),
        });
    }

    /// Release the binding's retained key and mark it removed
    ///
    /// A load still in flight for this binding releases its own result when
    /// it completes.
    pub fn detach(&self, binding: &DisplayBinding) {
        let previous = {
            let mut state = binding.lock();
            if state.phase == LoadPhase::Removed {
                return;
            }
            state.phase = LoadPhase::Removed;
            state.generation += 1;
            state.retained_key.take()
        };
        if let Some(previous) = previous {
            self.release(&previous);
        }
        log::debug!("detached display binding {}", binding.id());
    }

    /// Advance every animated texture to `now`; returns how many changed
    pub fn tick(&self, now: Instant) -> usize {
        self.cache()
            .resources()
            .iter()
            .filter(|texture| texture.update(now))
            .count()
    }

    fn release(&self, key: &CacheKey) {
        // Unknown keys are logged by the cache
        let _ = self.cache().release(key);
    }
}
