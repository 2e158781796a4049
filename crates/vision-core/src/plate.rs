//! Weight-plate detection with a gradient-directed circle transform.
//!
//! Edge pixels vote for circle centers along their gradient direction (both
//! senses, so dark-on-light and light-on-dark plates both work). For every
//! candidate radius the best 3x3 accumulator neighborhood is scored by the
//! fraction of the circumference it explains; the winning circle's radius
//! is then refined from the edge pixels that lie on it.

use barpath_motion_model::Point2;
use image::imageops::FilterType;
use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use serde::{Deserialize, Serialize};

/// Plate detector tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlateEstimatorConfig {
    /// The frame is downscaled so its long edge is at most this many pixels.
    pub working_size: u32,
    pub blur_sigma: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Smallest radius searched, as a fraction of the shorter frame side.
    pub min_radius_fraction: f64,
    /// Largest radius searched, as a fraction of the shorter frame side.
    pub max_radius_fraction: f64,
    /// Minimum fraction of the circumference that must be supported by edges.
    pub min_support: f64,
}

impl Default for PlateEstimatorConfig {
    fn default() -> Self {
        Self {
            working_size: 320,
            blur_sigma: 1.2,
            canny_low: 20.0,
            canny_high: 60.0,
            min_radius_fraction: 0.05,
            max_radius_fraction: 0.48,
            min_support: 0.35,
        }
    }
}

/// A detected circle in full-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateDetection {
    pub center: Point2,
    pub radius_px: f64,
    /// Fraction of the circumference backed by edge pixels, in `[0, 1]`.
    pub support: f64,
}

impl PlateDetection {
    pub fn diameter_px(&self) -> f64 {
        self.radius_px * 2.0
    }
}

struct EdgePixel {
    x: f64,
    y: f64,
    ux: f64,
    uy: f64,
}

struct Candidate {
    radius: usize,
    cx: usize,
    cy: usize,
    votes: u32,
    score: f64,
}

/// Circle detector for weight plates.
#[derive(Debug, Clone)]
pub struct PlateEstimator {
    config: PlateEstimatorConfig,
}

impl PlateEstimator {
    pub fn new(config: PlateEstimatorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PlateEstimatorConfig::default())
    }

    /// Find the most complete circle in `gray`, or `None` if nothing meets
    /// the support threshold.
    pub fn detect(&self, gray: &GrayImage) -> Option<PlateDetection> {
        let (width, height) = gray.dimensions();
        if width < 16 || height < 16 {
            return None;
        }

        let long_edge = width.max(height);
        let scale = (self.config.working_size as f64 / long_edge as f64).min(1.0);
        let working = if scale < 1.0 {
            let w = ((width as f64 * scale).round() as u32).max(1);
            let h = ((height as f64 * scale).round() as u32).max(1);
            image::imageops::resize(gray, w, h, FilterType::Triangle)
        } else {
            gray.clone()
        };
        // Actual ratio after rounding.
        let scale = working.width() as f64 / width as f64;

        let blurred = gaussian_blur_f32(&working, self.config.blur_sigma);
        let edges = canny(&blurred, self.config.canny_low, self.config.canny_high);
        let edge_pixels = collect_edges(&blurred, &edges);
        if edge_pixels.is_empty() {
            return None;
        }

        let (w, h) = (working.width() as usize, working.height() as usize);
        let min_side = w.min(h) as f64;
        let r_min = ((min_side * self.config.min_radius_fraction).round() as usize).max(4);
        let r_max = (min_side * self.config.max_radius_fraction).round() as usize;
        if r_max < r_min {
            return None;
        }

        let best = best_circle(&edge_pixels, w, h, r_min, r_max)?;
        tracing::debug!(
            radius = best.radius,
            votes = best.votes,
            score = best.score,
            edges = edge_pixels.len(),
            "Best plate candidate"
        );
        if best.score < self.config.min_support {
            return None;
        }

        let center = Point2::new(best.cx as f64, best.cy as f64);
        let radius = refine_radius(&edge_pixels, &center, best.radius as f64);

        Some(PlateDetection {
            center: Point2::new(center.x / scale, center.y / scale),
            radius_px: radius / scale,
            support: best.score.min(1.0),
        })
    }
}

fn collect_edges(blurred: &GrayImage, edges: &GrayImage) -> Vec<EdgePixel> {
    let gx = horizontal_sobel(blurred);
    let gy = vertical_sobel(blurred);
    let mut out = Vec::new();
    for (x, y, px) in edges.enumerate_pixels() {
        if px.0[0] == 0 {
            continue;
        }
        let dx = gx.get_pixel(x, y).0[0] as f64;
        let dy = gy.get_pixel(x, y).0[0] as f64;
        let mag = dx.hypot(dy);
        if mag <= f64::EPSILON {
            continue;
        }
        out.push(EdgePixel {
            x: x as f64,
            y: y as f64,
            ux: dx / mag,
            uy: dy / mag,
        });
    }
    out
}

fn best_circle(
    edges: &[EdgePixel],
    w: usize,
    h: usize,
    r_min: usize,
    r_max: usize,
) -> Option<Candidate> {
    let mut acc = vec![0u32; w * h];
    let mut touched: Vec<usize> = Vec::new();
    let mut best: Option<Candidate> = None;

    for r in r_min..=r_max {
        for idx in touched.drain(..) {
            acc[idx] = 0;
        }
        let rf = r as f64;
        for e in edges {
            for sign in [1.0, -1.0] {
                let cx = (e.x + sign * rf * e.ux).round();
                let cy = (e.y + sign * rf * e.uy).round();
                if cx < 1.0 || cy < 1.0 || cx >= (w - 1) as f64 || cy >= (h - 1) as f64 {
                    continue;
                }
                let idx = cy as usize * w + cx as usize;
                if acc[idx] == 0 {
                    touched.push(idx);
                }
                acc[idx] += 1;
            }
        }

        let circumference = 2.0 * std::f64::consts::PI * rf;
        for &idx in &touched {
            let (cx, cy) = (idx % w, idx / w);
            let mut votes = 0u32;
            for ny in cy - 1..=cy + 1 {
                for nx in cx - 1..=cx + 1 {
                    votes += acc[ny * w + nx];
                }
            }
            let score = votes as f64 / circumference;
            let better = match &best {
                None => true,
                Some(b) => score > b.score,
            };
            if better {
                best = Some(Candidate {
                    radius: r,
                    cx,
                    cy,
                    votes,
                    score,
                });
            }
        }
    }
    best
}

/// Mean distance from `center` of the edge pixels within two pixels of the
/// coarse radius.
fn refine_radius(edges: &[EdgePixel], center: &Point2, coarse: f64) -> f64 {
    let (sum, count) = edges
        .iter()
        .map(|e| Point2::new(e.x, e.y).distance(center))
        .filter(|d| (d - coarse).abs() <= 2.0)
        .fold((0.0, 0usize), |(s, n), d| (s + d, n + 1));
    if count == 0 {
        coarse
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_circle_mut;

    #[test]
    fn test_detects_dark_plate() {
        let mut img = GrayImage::from_pixel(640, 480, Luma([170]));
        draw_filled_circle_mut(&mut img, (320, 240), 150, Luma([30]));
        let plate = PlateEstimator::with_defaults().detect(&img).expect("plate");
        assert!((plate.diameter_px() - 300.0).abs() < 12.0, "{plate:?}");
        assert!(plate.center.distance(&Point2::new(320.0, 240.0)) < 6.0);
        assert!(plate.support > 0.35 && plate.support <= 1.0);
    }

    #[test]
    fn test_detects_light_plate_off_center() {
        let mut img = GrayImage::from_pixel(320, 240, Luma([20]));
        draw_filled_circle_mut(&mut img, (110, 130), 60, Luma([220]));
        let plate = PlateEstimator::with_defaults().detect(&img).expect("plate");
        assert!((plate.radius_px - 60.0).abs() < 3.0, "{plate:?}");
    }

    #[test]
    fn test_blank_frame_has_no_plate() {
        let img = GrayImage::from_pixel(320, 240, Luma([128]));
        assert!(PlateEstimator::with_defaults().detect(&img).is_none());
    }
}
