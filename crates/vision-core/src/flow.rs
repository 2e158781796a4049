//! Sparse pyramidal Lucas–Kanade optical flow.
//!
//! Each feature is tracked coarse-to-fine: the displacement found at level
//! `l` seeds level `l - 1` after doubling. At every level a Gauss–Newton
//! loop solves the 2x2 normal equations over a square window until the
//! update is below `epsilon` or `max_iterations` is reached. Windows whose
//! structure tensor is near-singular (minimum eigenvalue below
//! `min_eigen_threshold`, normalized by window area) are rejected.

use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{FrameDimensions, Point2};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::plane::Plane;

/// Lucas–Kanade tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlowConfig {
    /// Side of the square integration window (odd).
    pub window_size: usize,
    /// Number of pyramid levels above the base image.
    pub max_level: usize,
    pub max_iterations: usize,
    /// Convergence threshold on the update length, in pixels.
    pub epsilon: f32,
    pub min_eigen_threshold: f32,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            window_size: 11,
            max_level: 3,
            max_iterations: 20,
            epsilon: 0.01,
            min_eigen_threshold: 1e-4,
        }
    }
}

impl FlowConfig {
    fn half_window(&self) -> isize {
        (self.window_size.max(3) / 2) as isize
    }
}

/// One pyramid level with precomputed gradients.
#[derive(Debug, Clone)]
struct Level {
    image: Plane,
    grad_x: Plane,
    grad_y: Plane,
}

/// Gaussian image pyramid of one frame, base level first.
#[derive(Debug, Clone)]
pub struct Pyramid {
    dimensions: FrameDimensions,
    levels: Vec<Level>,
}

impl Pyramid {
    /// Build up to `max_level` levels above the base, stopping early once
    /// a level would be smaller than the tracking window.
    pub fn build(gray: &GrayImage, config: &FlowConfig) -> BarpathResult<Self> {
        let (width, height) = gray.dimensions();
        let window = config.window_size.max(3);
        if (width as usize) < window || (height as usize) < window {
            return Err(BarpathError::flow(format!(
                "frame {width}x{height} is smaller than the {window}px flow window"
            )));
        }

        let mut planes = vec![Plane::from_gray(gray)];
        for _ in 0..config.max_level {
            let Some(last) = planes.last() else { break };
            let next = last.pyr_down();
            if next.width() < window || next.height() < window {
                break;
            }
            planes.push(next);
        }

        let levels = planes
            .into_iter()
            .map(|image| {
                let (grad_x, grad_y) = image.gradients();
                Level {
                    image,
                    grad_x,
                    grad_y,
                }
            })
            .collect();

        Ok(Self {
            dimensions: FrameDimensions::new(width, height),
            levels,
        })
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    /// Levels including the base image.
    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// Per-point outcome of one flow step.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowResult {
    /// New position for every input point (the input position when lost).
    pub positions: Vec<Point2>,
    /// `true` when the point converged on a well-conditioned window.
    pub status: Vec<bool>,
    /// Mean absolute residual over the final window, per point.
    pub error: Vec<f32>,
}

impl FlowResult {
    pub fn tracked_count(&self) -> usize {
        self.status.iter().filter(|s| **s).count()
    }
}

/// Track `points` from `prev` into `next`.
///
/// Fails outright only when the two pyramids cannot be compared; a
/// feature that cannot be tracked just gets `status = false`.
pub fn track_points(
    prev: &Pyramid,
    next: &Pyramid,
    points: &[Point2],
    config: &FlowConfig,
) -> BarpathResult<FlowResult> {
    if prev.dimensions != next.dimensions {
        return Err(BarpathError::DimensionMismatch {
            expected_width: prev.dimensions.width,
            expected_height: prev.dimensions.height,
            width: next.dimensions.width,
            height: next.dimensions.height,
        });
    }
    let depth = prev.depth().min(next.depth());
    if depth == 0 {
        return Err(BarpathError::flow("empty pyramid"));
    }

    let mut positions = Vec::with_capacity(points.len());
    let mut status = Vec::with_capacity(points.len());
    let mut error = Vec::with_capacity(points.len());

    for point in points {
        match track_one(prev, next, depth, point, config) {
            Some((p, residual)) => {
                positions.push(p);
                status.push(true);
                error.push(residual);
            }
            None => {
                positions.push(*point);
                status.push(false);
                error.push(f32::INFINITY);
            }
        }
    }

    Ok(FlowResult {
        positions,
        status,
        error,
    })
}

fn track_one(
    prev: &Pyramid,
    next: &Pyramid,
    depth: usize,
    point: &Point2,
    config: &FlowConfig,
) -> Option<(Point2, f32)> {
    if !point.is_finite() {
        return None;
    }
    let half = config.half_window();
    let area = ((2 * half + 1) * (2 * half + 1)) as f32;
    let top = depth - 1;

    // Displacement guess at the current level.
    let (mut gx, mut gy) = (0.0f32, 0.0f32);
    let mut residual = 0.0f32;

    for lvl in (0..=top).rev() {
        let scale = (1u32 << lvl) as f32;
        let px = point.x as f32 / scale;
        let py = point.y as f32 / scale;
        let p = &prev.levels[lvl];
        let n = &next.levels[lvl];

        // Structure tensor is constant across iterations at one level.
        let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
        for wy in -half..=half {
            for wx in -half..=half {
                let sx = px + wx as f32;
                let sy = py + wy as f32;
                let ix = p.grad_x.sample(sx, sy);
                let iy = p.grad_y.sample(sx, sy);
                a += ix * ix;
                b += ix * iy;
                c += iy * iy;
            }
        }
        let det = a * c - b * b;
        let lambda_min = 0.5 * ((a + c) - ((a - c) * (a - c) + 4.0 * b * b).sqrt());
        if det.abs() < f32::EPSILON || lambda_min / area < config.min_eigen_threshold {
            return None;
        }
        let inv_det = 1.0 / det;

        let (mut dx, mut dy) = (gx, gy);
        for _ in 0..config.max_iterations {
            let (mut bx, mut by) = (0.0f32, 0.0f32);
            let mut abs_sum = 0.0f32;
            for wy in -half..=half {
                for wx in -half..=half {
                    let sx = px + wx as f32;
                    let sy = py + wy as f32;
                    let it = n.image.sample(sx + dx, sy + dy) - p.image.sample(sx, sy);
                    bx += p.grad_x.sample(sx, sy) * it;
                    by += p.grad_y.sample(sx, sy) * it;
                    abs_sum += it.abs();
                }
            }
            residual = abs_sum / area;

            let ux = -(c * bx - b * by) * inv_det;
            let uy = -(a * by - b * bx) * inv_det;
            if !ux.is_finite() || !uy.is_finite() {
                return None;
            }
            dx += ux;
            dy += uy;
            if ux * ux + uy * uy < config.epsilon * config.epsilon {
                break;
            }
        }

        if lvl > 0 {
            gx = dx * 2.0;
            gy = dy * 2.0;
        } else {
            gx = dx;
            gy = dy;
        }
    }

    let tracked = Point2::new(point.x + gx as f64, point.y + gy as f64);
    tracked.is_finite().then_some((tracked, residual))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    fn blob_frame(cx: i32, cy: i32) -> GrayImage {
        let mut img = GrayImage::from_pixel(160, 120, Luma([40]));
        draw_filled_circle_mut(&mut img, (cx, cy), 12, Luma([210]));
        img
    }

    fn track_blob(dx: i32, dy: i32, config: &FlowConfig) -> FlowResult {
        let prev = Pyramid::build(&blob_frame(70, 60), config).unwrap();
        let next = Pyramid::build(&blob_frame(70 + dx, 60 + dy), config).unwrap();
        // Track a point on the blob's left edge where the gradient is strong.
        let start = Point2::new(58.0, 60.0);
        let edge_top = Point2::new(70.0, 48.0);
        track_points(&prev, &next, &[start, edge_top], config).unwrap()
    }

    #[test]
    fn test_small_translation() {
        let config = FlowConfig {
            window_size: 21,
            ..FlowConfig::default()
        };
        let result = track_blob(3, 2, &config);
        assert_eq!(result.tracked_count(), 2);
        let p = result.positions[0];
        assert!((p.x - 61.0).abs() < 0.5, "x = {}", p.x);
        assert!((p.y - 62.0).abs() < 0.5, "y = {}", p.y);
    }

    #[test]
    fn test_large_translation_needs_pyramid() {
        let config = FlowConfig {
            window_size: 21,
            max_level: 3,
            ..FlowConfig::default()
        };
        let result = track_blob(9, 0, &config);
        let p = result.positions[0];
        assert!(result.status[0]);
        assert!((p.x - 67.0).abs() < 1.0, "x = {}", p.x);
    }

    #[test]
    fn test_flat_region_is_rejected() {
        let config = FlowConfig::default();
        let img = GrayImage::from_pixel(64, 64, Luma([100]));
        let prev = Pyramid::build(&img, &config).unwrap();
        let next = Pyramid::build(&img, &config).unwrap();
        let result = track_points(&prev, &next, &[Point2::new(32.0, 32.0)], &config).unwrap();
        assert_eq!(result.status, vec![false]);
        assert_eq!(result.positions[0], Point2::new(32.0, 32.0));
    }

    #[test]
    fn test_mismatched_pyramids_error() {
        let config = FlowConfig::default();
        let a = Pyramid::build(&GrayImage::new(64, 64), &config).unwrap();
        let b = Pyramid::build(&GrayImage::new(80, 64), &config).unwrap();
        let err = track_points(&a, &b, &[], &config).unwrap_err();
        assert!(matches!(err, BarpathError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_tiny_frame_fails_pyramid() {
        let err = Pyramid::build(&GrayImage::new(5, 5), &FlowConfig::default()).unwrap_err();
        assert!(matches!(err, BarpathError::FlowComputation { .. }));
    }

    #[test]
    fn test_pyramid_depth_limited_by_window() {
        let config = FlowConfig {
            window_size: 11,
            max_level: 5,
            ..FlowConfig::default()
        };
        let pyramid = Pyramid::build(&GrayImage::new(64, 48), &config).unwrap();
        // 64x48 -> 32x24 -> 16x12; 8x6 is below the window.
        assert_eq!(pyramid.depth(), 3);
    }
}
