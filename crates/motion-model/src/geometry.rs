//! Pixel-space geometry.
//!
//! Unlike normalized viewports, everything here is in frame pixels with
//! `(0, 0)` at the top-left and `y` growing downward.

use serde::{Deserialize, Serialize};

/// A 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f64,
    pub y: f64,
}

impl Point2 {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance(&self, other: &Point2) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Linear blend: `t = 0` gives `self`, `t = 1` gives `other`.
    pub fn lerp(&self, other: &Point2, t: f64) -> Point2 {
        Point2 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// An axis-aligned rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Region {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Region {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// The whole frame.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f64, height as f64)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point2 {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Check if a point lies within this region (edges inclusive).
    pub fn contains(&self, p: &Point2) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Grow on every side by `margin` pixels.
    pub fn expand(&self, margin: f64) -> Self {
        Self::new(
            self.x - margin,
            self.y - margin,
            self.width + 2.0 * margin,
            self.height + 2.0 * margin,
        )
    }

    /// Scale position and size by `factor` (e.g. mapping a box found on a
    /// downscaled image back to the full-size frame).
    pub fn scale(&self, factor: f64) -> Self {
        Self::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }

    /// Intersect with the frame `[0, width] x [0, height]`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        let x0 = self.x.clamp(0.0, w);
        let y0 = self.y.clamp(0.0, h);
        let x1 = self.right().clamp(0.0, w);
        let y1 = self.bottom().clamp(0.0, h);
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_distance_and_lerp() {
        let a = Point2::new(0.0, 0.0);
        let b = Point2::new(3.0, 4.0);
        assert!((a.distance(&b) - 5.0).abs() < 1e-12);
        let mid = a.lerp(&b, 0.5);
        assert!((mid.x - 1.5).abs() < 1e-12);
        assert!((mid.y - 2.0).abs() < 1e-12);
        assert!(!Point2::new(f64::NAN, 0.0).is_finite());
    }

    #[test]
    fn test_region_contains_and_center() {
        let r = Region::new(10.0, 20.0, 100.0, 50.0);
        assert!(r.contains(&Point2::new(10.0, 20.0)));
        assert!(r.contains(&Point2::new(110.0, 70.0)));
        assert!(!r.contains(&Point2::new(111.0, 70.0)));
        assert_eq!(r.center(), Point2::new(60.0, 45.0));
    }

    #[test]
    fn test_region_clamp_to_frame() {
        let r = Region::new(-20.0, 400.0, 100.0, 200.0).clamp_to(640, 480);
        assert_eq!(r, Region::new(0.0, 400.0, 80.0, 80.0));

        let outside = Region::new(700.0, 10.0, 50.0, 50.0).clamp_to(640, 480);
        assert!(outside.is_empty());
    }

    #[test]
    fn test_region_expand_and_scale() {
        let r = Region::new(10.0, 10.0, 20.0, 20.0).expand(5.0);
        assert_eq!(r, Region::new(5.0, 5.0, 30.0, 30.0));
        let s = r.scale(2.0);
        assert_eq!(s, Region::new(10.0, 10.0, 60.0, 60.0));
    }

    #[test]
    fn test_negative_size_is_empty() {
        let r = Region::new(0.0, 0.0, -5.0, 10.0);
        assert!(r.is_empty());
        assert_eq!(r.area(), 0.0);
    }
}
