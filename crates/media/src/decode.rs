//! Content-type driven texture decoding
//!
//! The pipeline picks a path from the content type: GIFs are fetched here and
//! decoded on the shared [`GifDecodeWorker`], everything else is handed to a
//! [`TextureFactory`]. Every call blocks its thread until the texture is ready.

use std::sync::Arc;
use std::time::Instant;

use crate::animation::AnimatedTexture;
use crate::compressed::CompressedTexture;
use crate::fetch::Fetcher;
use crate::texture::Texture;
use crate::worker::GifDecodeWorker;
use crate::MediaError;

/// Decode path for a content type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Gif,
    Basis,
    Image,
}

impl MediaKind {
    /// Classify a content type, rejecting anything that is not an image
    pub fn from_content_type(content_type: &str) -> Result<Self, MediaError> {
        if content_type.contains("image/gif") {
            Ok(Self::Gif)
        } else if content_type.contains("image/basis") {
            Ok(Self::Basis)
        } else if content_type.starts_with("image/") {
            Ok(Self::Image)
        } else {
            Err(MediaError::UnsupportedMediaType(content_type.to_string()))
        }
    }
}

/// Creates textures for the non-GIF paths
pub trait TextureFactory: Send + Sync {
    /// Create a texture from a generic image (png, jpeg, webp, ...)
    fn create_image_texture(&self, url: &str) -> Result<Texture, MediaError>;

    /// Create a texture from a basis universal file
    fn create_basis_texture(&self, url: &str) -> Result<Texture, MediaError>;
}

/// [`TextureFactory`] that fetches bytes and decodes them in-process
pub struct FetchingTextureFactory {
    fetcher: Arc<dyn Fetcher>,
}

impl FetchingTextureFactory {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self { fetcher }
    }
}

impl TextureFactory for FetchingTextureFactory {
    fn create_image_texture(&self, url: &str) -> Result<Texture, MediaError> {
        let bytes = self.fetcher.get_bytes(url)?;
        let image = image::load_from_memory(&bytes).map_err(|e| MediaError::decode(url, e))?;
        Ok(Texture::from_image(image.to_rgba8()))
    }

    fn create_basis_texture(&self, url: &str) -> Result<Texture, MediaError> {
        let bytes = self.fetcher.get_bytes(url)?;
        let texture = CompressedTexture::from_basis(bytes).map_err(|e| MediaError::decode(url, e))?;
        Ok(Texture::compressed(texture))
    }
}

/// Turns a URL and its content type into a [`Texture`]
pub struct DecodePipeline {
    fetcher: Arc<dyn Fetcher>,
    factory: Arc<dyn TextureFactory>,
    gif_worker: Arc<GifDecodeWorker>,
}

impl DecodePipeline {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        factory: Arc<dyn TextureFactory>,
        gif_worker: Arc<GifDecodeWorker>,
    ) -> Self {
        Self {
            fetcher,
            factory,
            gif_worker,
        }
    }

    /// Pipeline whose factory fetches through the same `fetcher`
    pub fn with_fetcher(fetcher: Arc<dyn Fetcher>, gif_worker: Arc<GifDecodeWorker>) -> Self {
        let factory = Arc::new(FetchingTextureFactory::new(fetcher.clone()));
        Self::new(fetcher, factory, gif_worker)
    }

    /// Decode `url` as `content_type`
    pub fn decode(&self, url: &str, content_type: &str) -> Result<Texture, MediaError> {
        match MediaKind::from_content_type(content_type)? {
            MediaKind::Gif => self.decode_gif(url),
            MediaKind::Basis => self.factory.create_basis_texture(url),
            MediaKind::Image => self.factory.create_image_texture(url),
        }
    }

    fn decode_gif(&self, url: &str) -> Result<Texture, MediaError> {
        let bytes = self.fetcher.get_bytes(url)?;
        let frames = self.gif_worker.decode(url, bytes)?;
        let animation = AnimatedTexture::new(frames, Instant::now())
            .ok_or_else(|| MediaError::decode(url, "gif has no frames"))?;
        Ok(Texture::animated(animation))
    }
}
