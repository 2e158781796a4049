//! Raw decoded frames as supplied by the caller.

use barpath_common::error::{BarpathError, BarpathResult};
use serde::{Deserialize, Serialize};

/// Bytes per RGBA pixel.
pub const RGBA_CHANNELS: usize = 4;

/// Pixel dimensions of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameDimensions {
    pub width: u32,
    pub height: u32,
}

impl FrameDimensions {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Length of the shorter side.
    pub fn min_side(&self) -> u32 {
        self.width.min(self.height)
    }
}

impl std::fmt::Display for FrameDimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A decoded RGBA8 frame with explicit dimensions.
///
/// Construction validates the buffer so downstream stages can index
/// without re-checking.
#[derive(Clone, PartialEq, Eq)]
pub struct RgbaFrame {
    dimensions: FrameDimensions,
    data: Vec<u8>,
}

impl RgbaFrame {
    /// Wrap a raw buffer, rejecting empty or mis-sized input.
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> BarpathResult<Self> {
        if width == 0 || height == 0 {
            return Err(BarpathError::invalid_frame(format!(
                "frame has zero dimension ({width}x{height})"
            )));
        }
        let expected = width as usize * height as usize * RGBA_CHANNELS;
        if data.len() != expected {
            return Err(BarpathError::invalid_frame(format!(
                "buffer length {} does not match {width}x{height} RGBA ({expected} bytes)",
                data.len()
            )));
        }
        Ok(Self {
            dimensions: FrameDimensions::new(width, height),
            data,
        })
    }

    /// A frame filled with one color.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> BarpathResult<Self> {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * RGBA_CHANNELS)
            .collect();
        Self::new(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl std::fmt::Debug for RgbaFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RgbaFrame")
            .field("dimensions", &self.dimensions)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// A frame together with its position in the sampled stream.
#[derive(Debug, Clone)]
pub struct SampledFrame {
    /// Index in the sampled (not native) stream, starting at 0.
    pub index: u32,
    /// Presentation time in milliseconds.
    pub timestamp_ms: f64,
    pub frame: RgbaFrame,
}
