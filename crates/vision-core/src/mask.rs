//! Weighted detection masks.
//!
//! A mask holds one weight in `0..=255` per pixel. Zero excludes the pixel
//! from corner detection; anything else scales the corner response, so a
//! peripheral corner can still win if it is strong enough.

use barpath_motion_model::{FrameDimensions, Region};
use serde::{Deserialize, Serialize};

/// Center-weighted ellipse used when no region hint is available.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForegroundMaskConfig {
    /// Ellipse semi-axis along x as a fraction of frame width.
    pub width_fraction: f64,
    /// Ellipse semi-axis along y as a fraction of frame height.
    pub height_fraction: f64,
}

impl Default for ForegroundMaskConfig {
    fn default() -> Self {
        Self {
            width_fraction: 0.4,
            height_fraction: 0.5,
        }
    }
}

/// Soft falloff around a hinted region.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HintMaskConfig {
    /// Pixels added on every side of the hinted box before weighting.
    pub margin_px: f64,
    /// Weight decrease per unit of normalized distance outside the box.
    pub falloff: f64,
    /// Minimum relative weight anywhere in the frame.
    pub floor: f64,
}

impl Default for HintMaskConfig {
    fn default() -> Self {
        Self {
            margin_px: 20.0,
            falloff: 0.5,
            floor: 0.3,
        }
    }
}

/// Per-pixel detection weights.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightMask {
    dimensions: FrameDimensions,
    weights: Vec<u8>,
}

impl WeightMask {
    fn from_fn(dimensions: FrameDimensions, f: impl Fn(f64, f64) -> f64) -> Self {
        let mut weights = Vec::with_capacity(dimensions.pixel_count());
        for y in 0..dimensions.height {
            for x in 0..dimensions.width {
                let w = f(x as f64, y as f64).clamp(0.0, 1.0);
                weights.push((w * 255.0).round() as u8);
            }
        }
        Self {
            dimensions,
            weights,
        }
    }

    /// Every pixel at full weight.
    pub fn uniform(dimensions: FrameDimensions) -> Self {
        Self {
            dimensions,
            weights: vec![255; dimensions.pixel_count()],
        }
    }

    /// Foreground-biased ellipse: weight `1 - d²` where `d` is the
    /// normalized elliptical distance from the frame center.
    pub fn foreground_ellipse(dimensions: FrameDimensions, config: &ForegroundMaskConfig) -> Self {
        let cx = dimensions.width as f64 / 2.0;
        let cy = dimensions.height as f64 / 2.0;
        let rx = (dimensions.width as f64 * config.width_fraction).max(1.0);
        let ry = (dimensions.height as f64 * config.height_fraction).max(1.0);
        Self::from_fn(dimensions, |x, y| {
            let dx = (x - cx) / rx;
            let dy = (y - cy) / ry;
            1.0 - (dx * dx + dy * dy)
        })
    }

    /// Full weight inside the (expanded) hinted region, decaying linearly
    /// with normalized distance outside it and never below `floor`.
    pub fn region_falloff(
        dimensions: FrameDimensions,
        region: &Region,
        config: &HintMaskConfig,
    ) -> Self {
        let expanded = region
            .expand(config.margin_px)
            .clamp_to(dimensions.width, dimensions.height);
        if expanded.is_empty() {
            return Self::uniform(dimensions);
        }
        let half_w = (expanded.width / 2.0).max(1.0);
        let half_h = (expanded.height / 2.0).max(1.0);
        Self::from_fn(dimensions, |x, y| {
            let dx = (expanded.x - x).max(x - expanded.right()).max(0.0) / half_w;
            let dy = (expanded.y - y).max(y - expanded.bottom()).max(0.0) / half_h;
            let d = dx.hypot(dy);
            (1.0 - d * config.falloff).max(config.floor)
        })
    }

    /// Hard rectangle: full weight inside, zero outside.
    pub fn rectangle(dimensions: FrameDimensions, region: &Region) -> Self {
        let r = region.clamp_to(dimensions.width, dimensions.height);
        Self::from_fn(dimensions, |x, y| {
            if x >= r.x && x < r.right() && y >= r.y && y < r.bottom() {
                1.0
            } else {
                0.0
            }
        })
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    /// Weight at `(x, y)` as a fraction in `[0, 1]`.
    #[inline]
    pub fn weight(&self, x: u32, y: u32) -> f64 {
        self.weights[(y * self.dimensions.width + x) as usize] as f64 / 255.0
    }

    /// Number of pixels with non-zero weight.
    pub fn active_pixels(&self) -> usize {
        self.weights.iter().filter(|&&w| w > 0).count()
    }
}
