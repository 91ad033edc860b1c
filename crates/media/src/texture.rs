//! Decoded textures as stored in the texture cache

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use artwork_cache::Disposable;
use image::{Rgba, RgbaImage};

use crate::animation::AnimatedTexture;
use crate::compressed::CompressedTexture;

const PLACEHOLDER_SIZE: u32 = 8;
const PLACEHOLDER_CELL: u32 = 2;

/// A live media stream backing a texture (video, webcam, shared screen)
pub trait StreamHandle: Send {
    /// Stop playback and release the stream's tracks
    fn stop(&mut self);
}

/// Which representation a texture holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureKind {
    Image,
    Animated,
    Compressed,
    Placeholder,
}

enum TextureData {
    Image(RgbaImage),
    Animated(AnimatedTexture),
    Compressed(CompressedTexture),
    Released,
}

/// A GPU-ready texture
///
/// Size and kind are fixed at construction. The pixel storage is dropped by
/// [`Disposable::dispose`], after which the texture only answers metadata
/// queries.
pub struct Texture {
    width: u32,
    height: u32,
    kind: TextureKind,
    data: Mutex<TextureData>,
    stream: Mutex<Option<Box<dyn StreamHandle>>>,
    disposed: AtomicBool,
}

impl Texture {
    fn new(width: u32, height: u32, kind: TextureKind, data: TextureData) -> Self {
        Self {
            width,
            height,
            kind,
            data: Mutex::new(data),
            stream: Mutex::new(None),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(width, height, TextureKind::Image, TextureData::Image(image))
    }

    pub fn animated(animation: AnimatedTexture) -> Self {
        let (width, height) = (animation.width(), animation.height());
        Self::new(
            width,
            height,
            TextureKind::Animated,
            TextureData::Animated(animation),
        )
    }

    pub fn compressed(texture: CompressedTexture) -> Self {
        let (width, height) = (texture.width, texture.height);
        Self::new(
            width,
            height,
            TextureKind::Compressed,
            TextureData::Compressed(texture),
        )
    }

    /// Small checkerboard shown in place of media that failed to load
    pub fn placeholder() -> Self {
        let image = RgbaImage::from_fn(PLACEHOLDER_SIZE, PLACEHOLDER_SIZE, |x, y| {
            if (x / PLACEHOLDER_CELL + y / PLACEHOLDER_CELL) % 2 == 0 {
                Rgba([255, 0, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        });
        Self::new(
            PLACEHOLDER_SIZE,
            PLACEHOLDER_SIZE,
            TextureKind::Placeholder,
            TextureData::Image(image),
        )
    }

    /// Attach the stream this texture is fed from; it is stopped on dispose
    pub fn with_stream(self, stream: Box<dyn StreamHandle>) -> Self {
        *lock(&self.stream) = Some(stream);
        self
    }

    pub fn kind(&self) -> TextureKind {
        self.kind
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Current frame index of an animated texture
    pub fn frame(&self) -> Option<usize> {
        match &*lock(&self.data) {
            TextureData::Animated(animation) => Some(animation.frame()),
            _ => None,
        }
    }

    /// Advance animation to `now`; returns `true` when the pixels changed
    pub fn update(&self, now: Instant) -> bool {
        match &mut *lock(&self.data) {
            TextureData::Animated(animation) => animation.update(now),
            _ => false,
        }
    }

    /// Run `f` over the current RGBA pixels
    ///
    /// `None` for compressed or disposed textures.
    pub fn with_pixels<T>(&self, f: impl FnOnce(&RgbaImage) -> T) -> Option<T> {
        match &*lock(&self.data) {
            TextureData::Image(image) => Some(f(image)),
            TextureData::Animated(animation) => Some(f(animation.canvas())),
            TextureData::Compressed(_) | TextureData::Released => None,
        }
    }

    /// Run `f` over the compressed container bytes
    pub fn with_compressed<T>(&self, f: impl FnOnce(&[u8]) -> T) -> Option<T> {
        match &*lock(&self.data) {
            TextureData::Compressed(texture) => Some(f(&texture.data)),
            _ => None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Disposable for Texture {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut stream) = lock(&self.stream).take() {
            stream.stop();
        }
        *lock(&self.data) = TextureData::Released;
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("kind", &self.kind)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::{decode_gif, tests::encode_gif};
    use crate::compressed::tests::basis_file;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Arc, Weak};
    use std::time::Duration;

    struct CountingStream(Arc<AtomicUsize>);

    impl StreamHandle for CountingStream {
        fn stop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Records whether the texture still had pixels when the stream stopped
    struct PixelCheckingStream {
        texture: Weak<Texture>,
        had_pixels: Arc<AtomicBool>,
    }

    impl StreamHandle for PixelCheckingStream {
        fn stop(&mut self) {
            let had_pixels = self
                .texture
                .upgrade()
                .and_then(|texture| texture.with_pixels(|_| ()))
                .is_some();
            self.had_pixels.store(had_pixels, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_image_texture() {
        let texture = Texture::from_image(RgbaImage::new(6, 3));
        assert_eq!(texture.kind(), TextureKind::Image);
        assert_eq!(texture.dimensions(), (6, 3));
        assert_eq!(texture.with_pixels(|p| p.len()), Some(6 * 3 * 4));
        assert_eq!(texture.frame(), None);
        assert!(!texture.update(Instant::now()));
    }

    #[test]
    fn test_placeholder_is_square_checkerboard() {
        let texture = Texture::placeholder();
        assert_eq!(texture.kind(), TextureKind::Placeholder);
        let (w, h) = texture.dimensions();
        assert_eq!(w, h);
        let corners = texture
            .with_pixels(|p| (*p.get_pixel(0, 0), *p.get_pixel(PLACEHOLDER_CELL, 0)))
            .unwrap();
        assert_ne!(corners.0, corners.1);
    }

    #[test]
    fn test_compressed_texture_has_no_pixels() {
        let basis = CompressedTexture::from_basis(basis_file(64, 32)).unwrap();
        let texture = Texture::compressed(basis);
        assert_eq!(texture.dimensions(), (64, 32));
        assert!(texture.with_pixels(|_| ()).is_none());
        assert!(texture.with_compressed(|bytes| bytes.len()).is_some());
    }

    #[test]
    fn test_animated_texture_updates() {
        let bytes = encode_gif(
            2,
            2,
            &[
                (0, 0, 2, 2, 1, 1, gif::DisposalMethod::Keep),
                (0, 0, 2, 2, 2, 1, gif::DisposalMethod::Keep),
            ],
        );
        let start = Instant::now();
        let animation = AnimatedTexture::new(decode_gif(&bytes).unwrap(), start).unwrap();
        let texture = Texture::animated(animation);

        assert_eq!(texture.frame(), Some(0));
        assert!(texture.update(start + Duration::from_millis(11)));
        assert_eq!(texture.frame(), Some(1));
    }

    #[test]
    fn test_dispose_releases_pixels_and_stops_stream_once() {
        let stops = Arc::new(AtomicUsize::new(0));
        let texture = Texture::from_image(RgbaImage::new(2, 2))
            .with_stream(Box::new(CountingStream(stops.clone())));

        texture.dispose();
        texture.dispose();

        assert!(texture.is_disposed());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(texture.with_pixels(|_| ()).is_none());
        // Metadata survives disposal
        assert_eq!(texture.dimensions(), (2, 2));
    }

    #[test]
    fn test_dispose_stops_stream_before_releasing_pixels() {
        let had_pixels = Arc::new(AtomicBool::new(false));
        let texture = Arc::new_cyclic(|weak| {
            Texture::from_image(RgbaImage::new(2, 2)).with_stream(Box::new(PixelCheckingStream {
                texture: weak.clone(),
                had_pixels: had_pixels.clone(),
            }))
        });

        texture.dispose();

        assert!(had_pixels.load(Ordering::SeqCst));
        assert!(texture.with_pixels(|_| ()).is_none());
    }
}
