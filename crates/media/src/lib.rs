//! Artwork Media
//!
//! Everything between a source reference and a decoded texture: URL
//! resolution and proxying, content type negotiation, fetching, and the
//! decode pipeline with its GIF worker thread.

mod error;

pub mod animation;
pub mod compressed;
pub mod content_type;
pub mod decode;
pub mod fetch;
pub mod resolver;
pub mod texture;
pub mod worker;

pub use animation::{
    decode_gif, AnimatedTexture, FrameDisposal, GifError, GifFrames, MAX_DECODED_BYTES,
};
pub use compressed::{BasisError, CompressedTexture};
pub use content_type::{guess_content_type, ContentTypeResolver, INTERNAL_VIDEO_CONTENT_TYPE};
pub use decode::{DecodePipeline, FetchingTextureFactory, MediaKind, TextureFactory};
pub use error::MediaError;
pub use fetch::{parse_data_url, DataUrl, Fetcher, HttpFetcher};
pub use resolver::{
    CorsProxy, HttpMediaResolver, MediaResolver, ResolveQuality, ResolveRequest, ResolvedMedia,
    ResolvedMeta, ResolvedSource, UrlResolver,
};
pub use texture::{StreamHandle, Texture, TextureKind};
pub use worker::GifDecodeWorker;
