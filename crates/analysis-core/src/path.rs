//! Path reconstruction: one bar position per frame from raw tracked points.
//!
//! # Algorithm
//!
//! 1. **Group** points by frame index, dropping non-finite coordinates.
//! 2. **Cluster** each frame's points greedily around running centroids
//!    (`cluster_radius_px`).
//! 3. **Score** clusters large enough to matter by relative size and by
//!    distance to the previous path point.
//! 4. **Estimate** the winner's position with a coordinate-wise median.
//! 5. **Clamp** jumps larger than `max_jump_px` by blending toward the
//!    previous estimate.

use std::collections::BTreeMap;

use barpath_motion_model::{BarbellPathPoint, Point2, ReconstructedPath, TrackedPoint};
use serde::{Deserialize, Serialize};

/// Configuration for the path reconstructor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Points closer than this to a cluster centroid join that cluster.
    pub cluster_radius_px: f64,

    /// Frame-to-frame displacement above which the estimate is damped.
    pub max_jump_px: f64,

    /// Weight of the previous position when damping a jump, in `[0, 1]`.
    pub jump_blend: f64,

    /// Score weight for the cluster's share of the frame's points.
    pub size_weight: f64,

    /// Score weight for proximity to the previous path point.
    pub continuity_weight: f64,

    /// Clusters smaller than this are ignored unless nothing larger exists.
    pub min_cluster_size: usize,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            cluster_radius_px: 60.0,
            max_jump_px: 150.0,
            jump_blend: 0.7,
            size_weight: 0.6,
            continuity_weight: 0.4,
            min_cluster_size: 3,
        }
    }
}

#[derive(Debug, Clone)]
struct Cluster {
    centroid: Point2,
    members: Vec<Point2>,
}

impl Cluster {
    fn seed(p: Point2) -> Self {
        Self {
            centroid: p,
            members: vec![p],
        }
    }

    fn add(&mut self, p: Point2) {
        self.members.push(p);
        let n = self.members.len() as f64;
        self.centroid = Point2::new(
            self.centroid.x + (p.x - self.centroid.x) / n,
            self.centroid.y + (p.y - self.centroid.y) / n,
        );
    }

    fn median(&self) -> Point2 {
        let xs: Vec<f64> = self.members.iter().map(|p| p.x).collect();
        let ys: Vec<f64> = self.members.iter().map(|p| p.y).collect();
        Point2::new(median(xs), median(ys))
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Reduces the per-frame point cloud to a single barbell path.
pub struct PathReconstructor {
    config: PathConfig,
}

impl PathReconstructor {
    pub fn new(config: PathConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(PathConfig::default())
    }

    pub fn config(&self) -> &PathConfig {
        &self.config
    }

    /// Reconstruct the path from points accumulated over a whole run.
    ///
    /// Input order does not matter. Frames with no finite points produce no
    /// estimate and show up in `gaps`.
    pub fn reconstruct(&self, points: &[TrackedPoint]) -> ReconstructedPath {
        let mut frames: BTreeMap<u32, Vec<TrackedPoint>> = BTreeMap::new();
        let mut dropped = 0usize;
        for p in points {
            if p.position().is_finite() && p.timestamp_ms.is_finite() {
                frames.entry(p.frame_index).or_default().push(*p);
            } else {
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "Ignoring non-finite tracked points");
        }

        let mut path = ReconstructedPath::default();
        let mut previous: Option<Point2> = None;

        for (frame_index, frame_points) in &frames {
            let Some((estimate, support)) = self.estimate_frame(frame_points, previous) else {
                continue;
            };
            let timestamp_ms = frame_points
                .iter()
                .map(|p| p.timestamp_ms)
                .fold(f64::INFINITY, f64::min);
            path.push(BarbellPathPoint {
                frame_index: *frame_index,
                timestamp_ms,
                x: estimate.x,
                y: estimate.y,
                support,
            });
            previous = Some(estimate);
        }

        tracing::debug!(
            frames = frames.len(),
            path_points = path.len(),
            gaps = path.gaps.len(),
            "Path reconstructed"
        );
        path
    }

    fn estimate_frame(
        &self,
        points: &[TrackedPoint],
        previous: Option<Point2>,
    ) -> Option<(Point2, usize)> {
        let clusters = self.cluster(points);
        let largest = clusters.iter().map(|c| c.members.len()).max()?;
        let total = points.len() as f64;
        let eligible_size = self.config.min_cluster_size.min(largest).max(1);

        let best = clusters
            .iter()
            .filter(|c| c.members.len() >= eligible_size)
            .map(|c| (self.score(c, total, previous), c))
            .max_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, c)| c)?;

        let mut estimate = best.median();
        if let Some(prev) = previous {
            if prev.distance(&estimate) > self.config.max_jump_px {
                let damped = prev.lerp(&estimate, 1.0 - self.config.jump_blend.clamp(0.0, 1.0));
                tracing::trace!(
                    jump = prev.distance(&estimate),
                    "Damping path jump"
                );
                estimate = damped;
            }
        }
        Some((estimate, best.members.len()))
    }

    fn cluster(&self, points: &[TrackedPoint]) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = Vec::new();
        for p in points.iter().map(TrackedPoint::position) {
            let nearest = clusters
                .iter_mut()
                .map(|c| (c.centroid.distance(&p), c))
                .filter(|(d, _)| *d <= self.config.cluster_radius_px)
                .min_by(|a, b| a.0.total_cmp(&b.0));
            match nearest {
                Some((_, cluster)) => cluster.add(p),
                None => clusters.push(Cluster::seed(p)),
            }
        }
        clusters
    }

    fn score(&self, cluster: &Cluster, total: f64, previous: Option<Point2>) -> f64 {
        let size = cluster.members.len() as f64 / total;
        let continuity = match previous {
            Some(prev) => {
                let d = prev.distance(&cluster.centroid);
                1.0 - (d / self.config.max_jump_px.max(f64::EPSILON)).min(1.0)
            }
            None => 0.5,
        };
        size * self.config.size_weight + continuity * self.config.continuity_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(x: f64, y: f64, frame: u32) -> TrackedPoint {
        TrackedPoint::new(Point2::new(x, y), frame, frame as f64 * 66.0)
    }

    #[test]
    fn test_single_cluster_median() {
        let points = vec![
            tp(100.0, 200.0, 0),
            tp(104.0, 202.0, 0),
            tp(98.0, 198.0, 0),
        ];
        let path = PathReconstructor::with_defaults().reconstruct(&points);
        assert_eq!(path.len(), 1);
        let p = path.points[0];
        assert_eq!((p.x, p.y), (100.0, 200.0));
        assert_eq!(p.support, 3);
    }

    #[test]
    fn test_largest_cluster_wins_over_outlier() {
        let points = vec![
            tp(100.0, 100.0, 0),
            tp(102.0, 101.0, 0),
            tp(99.0, 99.0, 0),
            tp(500.0, 400.0, 0),
        ];
        let path = PathReconstructor::with_defaults().reconstruct(&points);
        assert!((path.points[0].x - 100.0).abs() < 2.0);
    }

    #[test]
    fn test_one_point_per_frame_sorted() {
        let points = vec![
            tp(100.0, 300.0, 2),
            tp(100.0, 320.0, 1),
            tp(100.0, 340.0, 0),
        ];
        let path = PathReconstructor::with_defaults().reconstruct(&points);
        let frames: Vec<u32> = path.points.iter().map(|p| p.frame_index).collect();
        assert_eq!(frames, vec![0, 1, 2]);
        assert!(path.gaps.is_empty());
    }

    #[test]
    fn test_missing_frames_become_gaps() {
        let points = vec![tp(100.0, 300.0, 0), tp(100.0, 290.0, 4)];
        let path = PathReconstructor::with_defaults().reconstruct(&points);
        assert_eq!(path.len(), 2);
        assert_eq!(path.missing_frames(), 3);
    }

    #[test]
    fn test_large_jump_is_damped() {
        let points = vec![tp(100.0, 100.0, 0), tp(400.0, 100.0, 1)];
        let path = PathReconstructor::with_defaults().reconstruct(&points);
        // 300px jump blended 70% toward the previous position.
        assert!((path.points[1].x - 190.0).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_points_ignored() {
        let points = vec![
            tp(f64::NAN, 10.0, 0),
            tp(f64::INFINITY, 10.0, 1),
            tp(50.0, 60.0, 1),
        ];
        let path = PathReconstructor::with_defaults().reconstruct(&points);
        assert_eq!(path.len(), 1);
        assert_eq!(path.points[0].frame_index, 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(PathReconstructor::with_defaults().reconstruct(&[]).is_empty());
    }

    #[test]
    fn test_continuity_breaks_size_tie() {
        let mut points = vec![tp(100.0, 100.0, 0), tp(101.0, 100.0, 0), tp(99.0, 100.0, 0)];
        // Two equal clusters; the one near the previous estimate wins.
        for x in [104.0, 105.0, 106.0, 300.0, 301.0, 302.0] {
            points.push(tp(x, 100.0, 1));
        }
        let path = PathReconstructor::with_defaults().reconstruct(&points);
        assert!((path.points[1].x - 105.0).abs() < 1e-9);
    }
}
