//! Basis Universal textures
//!
//! Transcoding is left to the GPU upload path. Here the file header is read for
//! its signature and the original size of the first image slice, which is all
//! the loader needs to lay out the display surface.

/// File signature, `sB` little-endian
const BASIS_SIGNATURE: [u8; 2] = [0x73, 0x42];
const HEADER_LEN: usize = 77;
const TOTAL_SLICES_OFFSET: usize = 14;
const SLICE_DESC_OFFSET_FIELD: usize = 65;
const SLICE_DESC_LEN: usize = 23;
const SLICE_ORIG_WIDTH: usize = 5;
const SLICE_ORIG_HEIGHT: usize = 7;

/// Error reading a basis file header
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BasisError {
    #[error("basis file truncated ({0} bytes)")]
    Truncated(usize),
    #[error("bad basis signature")]
    BadSignature,
    #[error("basis file has no image slices")]
    NoSlices,
}

/// A block-compressed texture kept in its container format
#[derive(Clone)]
pub struct CompressedTexture {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for CompressedTexture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressedTexture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl CompressedTexture {
    /// Validate a `.basis` file and take its dimensions from the first slice
    pub fn from_basis(data: Vec<u8>) -> Result<Self, BasisError> {
        if data.len() < HEADER_LEN {
            return Err(BasisError::Truncated(data.len()));
        }
        if data[..2] != BASIS_SIGNATURE {
            return Err(BasisError::BadSignature);
        }

        let total_slices = read_u24(&data, TOTAL_SLICES_OFFSET);
        if total_slices == 0 {
            return Err(BasisError::NoSlices);
        }

        let slice = read_u32(&data, SLICE_DESC_OFFSET_FIELD) as usize;
        if slice.saturating_add(SLICE_DESC_LEN) > data.len() {
            return Err(BasisError::Truncated(data.len()));
        }

        let width = u32::from(read_u16(&data, slice + SLICE_ORIG_WIDTH));
        let height = u32::from(read_u16(&data, slice + SLICE_ORIG_HEIGHT));
        Ok(Self {
            width,
            height,
            data,
        })
    }
}

fn read_u16(data: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([data[at], data[at + 1]])
}

fn read_u24(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], 0])
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}
