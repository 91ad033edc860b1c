//! Interface to the display entity showing an artwork.

use std::sync::Arc;

use artwork_media::Texture;

/// Notifications sent to observers of a display entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtworkEvent {
    /// A decode started for `src`
    ImageLoading { src: String },
    /// A texture (or the error placeholder) is now visible
    ImageLoaded {
        src: String,
        projection: Option<String>,
    },
}

impl ArtworkEvent {
    /// Wire name of the notification
    pub fn name(&self) -> &'static str {
        match self {
            Self::ImageLoading { .. } => "image-loading",
            Self::ImageLoaded { .. } => "image-loaded",
        }
    }
}

/// The on-screen entity a [`crate::DisplayBinding`] drives
///
/// Called from whichever thread runs the load, never while the loader holds
/// one of its locks.
pub trait DisplayHost: Send + Sync {
    fn set_visual_resource(&self, texture: Arc<Texture>);

    /// Resize the display surface
    fn set_scale(&self, width: f32, height: f32);

    fn emit(&self, event: ArtworkEvent);
}
