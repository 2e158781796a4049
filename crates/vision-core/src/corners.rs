//! Shi–Tomasi corner detection.
//!
//! The corner response is the smaller eigenvalue of the structure tensor
//! summed over a `block_size` window, scaled by the mask weight. Candidates
//! must be 3x3 local maxima above `quality_level * best_response` and are
//! accepted strongest-first while keeping `min_distance` apart.

use barpath_motion_model::Point2;
use image::GrayImage;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::{Deserialize, Serialize};

use crate::mask::WeightMask;

/// Parameters for one detection pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionPass {
    pub max_corners: usize,
    /// Fraction of the strongest response a candidate must reach.
    pub quality_level: f64,
    /// Minimum pixel distance between accepted corners.
    pub min_distance: f64,
    /// Side of the structure-tensor window (odd).
    pub block_size: u32,
}

impl DetectionPass {
    /// High-quality, well-spaced corners.
    pub const STRICT: DetectionPass = DetectionPass {
        max_corners: 12,
        quality_level: 0.12,
        min_distance: 40.0,
        block_size: 9,
    };

    /// Many weak, tightly packed corners.
    pub const RELAXED: DetectionPass = DetectionPass {
        max_corners: 100,
        quality_level: 0.005,
        min_distance: 5.0,
        block_size: 3,
    };

    /// Used when re-seeding after tracking loss or a dimension change.
    pub const REINIT: DetectionPass = DetectionPass {
        max_corners: 25,
        quality_level: 0.01,
        min_distance: 10.0,
        block_size: 3,
    };
}

/// Summed-area table over `f64` values.
struct Integral {
    stride: usize,
    sums: Vec<f64>,
}

impl Integral {
    fn new(width: usize, height: usize, value: impl Fn(usize, usize) -> f64) -> Self {
        let stride = width + 1;
        let mut sums = vec![0.0; stride * (height + 1)];
        for y in 0..height {
            let mut row = 0.0;
            for x in 0..width {
                row += value(x, y);
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    /// Sum over `[x0, x1) x [y0, y1)`.
    #[inline]
    fn window(&self, x0: usize, y0: usize, x1: usize, y1: usize) -> f64 {
        let s = self.stride;
        self.sums[y1 * s + x1] - self.sums[y0 * s + x1] - self.sums[y1 * s + x0]
            + self.sums[y0 * s + x0]
    }
}

/// Detect corners in `gray`, weighted by `mask`.
///
/// Returns corners ordered strongest first. A frame with no gradient
/// anywhere yields an empty list.
pub fn good_features_to_track(
    gray: &GrayImage,
    mask: &WeightMask,
    pass: &DetectionPass,
) -> Vec<Point2> {
    let (width, height) = gray.dimensions();
    let (w, h) = (width as usize, height as usize);
    let half = (pass.block_size.max(1) / 2) as usize;
    // Sobel is undefined on the outermost pixel ring.
    let border = half + 1;
    if w <= 2 * border || h <= 2 * border || pass.max_corners == 0 {
        return Vec::new();
    }
    debug_assert_eq!(mask.dimensions().width, width);

    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);
    let ix = |x: usize, y: usize| gx.get_pixel(x as u32, y as u32).0[0] as f64;
    let iy = |x: usize, y: usize| gy.get_pixel(x as u32, y as u32).0[0] as f64;

    let sxx = Integral::new(w, h, |x, y| ix(x, y) * ix(x, y));
    let sxy = Integral::new(w, h, |x, y| ix(x, y) * iy(x, y));
    let syy = Integral::new(w, h, |x, y| iy(x, y) * iy(x, y));

    let mut response = vec![0.0f64; w * h];
    let mut best = 0.0f64;
    for y in border..h - border {
        for x in border..w - border {
            let weight = mask.weight(x as u32, y as u32);
            if weight <= 0.0 {
                continue;
            }
            let (x0, y0, x1, y1) = (x - half, y - half, x + half + 1, y + half + 1);
            let a = sxx.window(x0, y0, x1, y1);
            let b = sxy.window(x0, y0, x1, y1);
            let c = syy.window(x0, y0, x1, y1);
            let lambda_min = 0.5 * ((a + c) - ((a - c) * (a - c) + 4.0 * b * b).sqrt());
            let r = lambda_min.max(0.0) * weight;
            response[y * w + x] = r;
            best = best.max(r);
        }
    }

    if best <= f64::EPSILON {
        return Vec::new();
    }
    let threshold = best * pass.quality_level;

    let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
    for y in border..h - border {
        for x in border..w - border {
            let r = response[y * w + x];
            if r < threshold || r <= 0.0 {
                continue;
            }
            let is_peak = (y - 1..=y + 1).all(|ny| {
                (x - 1..=x + 1).all(|nx| response[ny * w + nx] <= r)
            });
            if is_peak {
                candidates.push((r, x, y));
            }
        }
    }
    candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.2.cmp(&b.2)).then(a.1.cmp(&b.1)));

    select_spaced(&candidates, pass, w, h)
}

/// Greedy selection enforcing `min_distance` with a coarse grid lookup.
fn select_spaced(
    candidates: &[(f64, usize, usize)],
    pass: &DetectionPass,
    width: usize,
    height: usize,
) -> Vec<Point2> {
    let min_dist = pass.min_distance.max(0.0);
    let cell = min_dist.max(1.0);
    let grid_w = (width as f64 / cell).ceil() as usize + 1;
    let grid_h = (height as f64 / cell).ceil() as usize + 1;
    let mut grid: Vec<Vec<Point2>> = vec![Vec::new(); grid_w * grid_h];

    let mut accepted = Vec::new();
    for &(_, x, y) in candidates {
        let p = Point2::new(x as f64, y as f64);
        let gx = (p.x / cell) as usize;
        let gy = (p.y / cell) as usize;

        let crowded = min_dist > 0.0
            && (gy.saturating_sub(1)..=(gy + 1).min(grid_h - 1)).any(|cy| {
                (gx.saturating_sub(1)..=(gx + 1).min(grid_w - 1))
                    .any(|cx| grid[cy * grid_w + cx].iter().any(|q| q.distance(&p) < min_dist))
            });
        if crowded {
            continue;
        }

        grid[gy * grid_w + gx].push(p);
        accepted.push(p);
        if accepted.len() >= pass.max_corners {
            break;
        }
    }
    accepted
}

#[cfg(test)]
mod tests {
    use super::*;
    use barpath_motion_model::{FrameDimensions, Region};
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn square_frame(w: u32, h: u32, x: i32, y: i32, side: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([20]));
        draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(side, side), Luma([230]));
        img
    }

    #[test]
    fn test_blank_frame_has_no_corners() {
        let img = GrayImage::from_pixel(120, 90, Luma([128]));
        let mask = WeightMask::uniform(FrameDimensions::new(120, 90));
        assert!(good_features_to_track(&img, &mask, &DetectionPass::RELAXED).is_empty());
    }

    #[test]
    fn test_square_corners_found() {
        let img = square_frame(160, 120, 60, 40, 40);
        let mask = WeightMask::uniform(FrameDimensions::new(160, 120));
        let pass = DetectionPass {
            max_corners: 10,
            quality_level: 0.1,
            min_distance: 10.0,
            block_size: 5,
        };
        let corners = good_features_to_track(&img, &mask, &pass);
        assert_eq!(corners.len(), 4, "corners: {corners:?}");
        for (cx, cy) in [(60.0, 40.0), (99.0, 40.0), (60.0, 79.0), (99.0, 79.0)] {
            let target = Point2::new(cx, cy);
            assert!(
                corners.iter().any(|c| c.distance(&target) <= 3.0),
                "no corner near {target:?}"
            );
        }
    }

    #[test]
    fn test_min_distance_and_max_corners() {
        let img = square_frame(160, 120, 60, 40, 40);
        let mask = WeightMask::uniform(FrameDimensions::new(160, 120));
        let pass = DetectionPass {
            max_corners: 10,
            quality_level: 0.1,
            min_distance: 45.0,
            block_size: 5,
        };
        let corners = good_features_to_track(&img, &mask, &pass);
        assert_eq!(corners.len(), 2);
        assert!(corners[0].distance(&corners[1]) >= 45.0);

        let single = DetectionPass {
            max_corners: 1,
            ..pass
        };
        assert_eq!(good_features_to_track(&img, &mask, &single).len(), 1);
    }

    #[test]
    fn test_zero_mask_excludes_corners() {
        let img = square_frame(160, 120, 60, 40, 40);
        let dims = FrameDimensions::new(160, 120);
        let mask = WeightMask::rectangle(dims, &Region::new(0.0, 0.0, 30.0, 30.0));
        assert!(good_features_to_track(&img, &mask, &DetectionPass::STRICT).is_empty());
    }
}
