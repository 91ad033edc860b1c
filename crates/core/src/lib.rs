//! Artwork Loader Core
//!
//! Per-instance artwork loading on top of the shared texture store.
//!
//! An [`ArtworkLoader`] is built from an explicitly constructed
//! [`SharedTextureStore`] and the media services, then drives one
//! [`DisplayBinding`] per on-screen artwork through resolve, decode and bind.

pub mod binding;
pub mod config;
pub mod error;
pub mod host;
pub mod loader;

pub use binding::{DisplayBinding, LoadPhase};
pub use config::{ArtworkConfig, ConfigError};
pub use error::ArtworkError;
pub use host::{ArtworkEvent, DisplayHost};
pub use loader::{ArtworkLoader, ArtworkSource, LoadOutcome, SharedTextureStore};
