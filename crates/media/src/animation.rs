//! Animated GIF decoding and playback
//!
//! [`decode_gif`] turns raw bytes into canvas-sized frame bitmaps with their
//! delays and disposal methods. [`AnimatedTexture`] plays them back against
//! wall-clock time, one [`AnimatedTexture::update`] per render tick.

use std::io::Cursor;
use std::time::{Duration, Instant};

use image::{imageops, Rgba, RgbaImage};

/// What happens to a frame's area before the next frame is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposal {
    /// No disposal specified (code 0)
    Unspecified,
    /// Leave the frame in place (code 1)
    Keep,
    /// Clear to background before the next frame (code 2)
    Background,
    /// Restore what was there before the frame (code 3)
    Previous,
}

impl FrameDisposal {
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => Self::Keep,
            2 => Self::Background,
            3 => Self::Previous,
            _ => Self::Unspecified,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Unspecified => 0,
            Self::Keep => 1,
            Self::Background => 2,
            Self::Previous => 3,
        }
    }
}

impl From<gif::DisposalMethod> for FrameDisposal {
    fn from(method: gif::DisposalMethod) -> Self {
        match method {
            gif::DisposalMethod::Any => Self::Unspecified,
            gif::DisposalMethod::Keep => Self::Keep,
            gif::DisposalMethod::Background => Self::Background,
            gif::DisposalMethod::Previous => Self::Previous,
        }
    }
}

/// Upper bound on the frame bitmaps of one decoded GIF, matching the
/// `image` crate's default allocation limit
pub const MAX_DECODED_BYTES: u64 = 512 * 1024 * 1024;

/// Error from [`decode_gif`]
#[derive(Debug, thiserror::Error)]
pub enum GifError {
    #[error(transparent)]
    Decode(#[from] gif::DecodingError),
    #[error("gif frames need more than {limit} bytes ({width}x{height}, {frames} frames)")]
    TooLarge {
        width: u32,
        height: u32,
        frames: usize,
        limit: u64,
    },
}

/// Decoded frames of an animated GIF
///
/// Every frame bitmap has the logical screen size, with the frame's patch
/// placed at its offset and everything else transparent.
#[derive(Debug, Clone)]
pub struct GifFrames {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<RgbaImage>,
    pub delays: Vec<Duration>,
    pub disposals: Vec<FrameDisposal>,
}

impl GifFrames {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// Decode every frame of a GIF
///
/// Fails with [`GifError::TooLarge`] before allocating a frame that would
/// push the canvases past [`MAX_DECODED_BYTES`].
pub fn decode_gif(bytes: &[u8]) -> Result<GifFrames, GifError> {
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(Cursor::new(bytes))?;

    let width = u32::from(decoder.width());
    let height = u32::from(decoder.height());
    let canvas_bytes = u64::from(width) * u64::from(height) * 4;
    let mut frames = Vec::new();
    let mut delays = Vec::new();
    let mut disposals = Vec::new();

    while let Some(frame) = decoder.read_next_frame()? {
        // One more canvas is drawn on at playback
        let needed = canvas_bytes.saturating_mul(frames.len() as u64 + 2);
        if needed > MAX_DECODED_BYTES {
            return Err(GifError::TooLarge {
                width,
                height,
                frames: frames.len() + 1,
                limit: MAX_DECODED_BYTES,
            });
        }
        let mut canvas = RgbaImage::new(width, height);
        let patch = RgbaImage::from_raw(
            u32::from(frame.width),
            u32::from(frame.height),
            frame.buffer.to_vec(),
        );
        if let Some(patch) = patch {
            imageops::replace(
                &mut canvas,
                &patch,
                i64::from(frame.left),
                i64::from(frame.top),
            );
        }

        frames.push(canvas);
        // Delays are stored in hundredths of a second
        delays.push(Duration::from_millis(u64::from(frame.delay) * 10));
        disposals.push(FrameDisposal::from(frame.dispose));
    }

    Ok(GifFrames {
        width,
        height,
        frames,
        delays,
        disposals,
    })
}

/// A texture that cycles through GIF frames
pub struct AnimatedTexture {
    canvas: RgbaImage,
    frames: Vec<RgbaImage>,
    delays: Vec<Duration>,
    disposals: Vec<FrameDisposal>,
    frame: usize,
    frame_start: Instant,
    needs_update: bool,
}

impl AnimatedTexture {
    /// Build a texture showing the first frame as of `now`
    ///
    /// Returns `None` for a GIF without frames.
    pub fn new(frames: GifFrames, now: Instant) -> Option<Self> {
        let first = frames.frames.first()?;
        let mut canvas = RgbaImage::new(frames.width, frames.height);
        imageops::overlay(&mut canvas, first, 0, 0);

        Some(Self {
            canvas,
            frames: frames.frames,
            delays: frames.delays,
            disposals: frames.disposals,
            frame: 0,
            frame_start: now,
            needs_update: true,
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// Index of the frame currently on the canvas
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Return and clear the flag set whenever the canvas changed
    pub fn take_needs_update(&mut self) -> bool {
        std::mem::take(&mut self.needs_update)
    }

    /// Advance to the next frame once the current one's delay has elapsed
    ///
    /// Applies the outgoing frame's disposal before drawing the incoming one.
    /// Returns `true` when the canvas changed.
    pub fn update(&mut self, now: Instant) -> bool {
        let delay = self.delays.get(self.frame).copied().unwrap_or_default();
        if now.saturating_duration_since(self.frame_start) <= delay {
            return false;
        }

        if self.disposals.get(self.frame) == Some(&FrameDisposal::Background) {
            for pixel in self.canvas.pixels_mut() {
                *pixel = Rgba([0, 0, 0, 0]);
            }
        }

        self.frame = (self.frame + 1) % self.frames.len();
        self.frame_start = now;
        imageops::overlay(&mut self.canvas, &self.frames[self.frame], 0, 0);
        self.needs_update = true;
        true
    }
}
