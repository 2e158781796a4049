//! Per-frame tracking output and the reconstructed barbell path.

use serde::{Deserialize, Serialize};

use crate::geometry::Point2;

/// A surviving feature position in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackedPoint {
    pub x: f64,
    pub y: f64,
    pub frame_index: u32,
    pub timestamp_ms: f64,
}

impl TrackedPoint {
    pub fn new(position: Point2, frame_index: u32, timestamp_ms: f64) -> Self {
        Self {
            x: position.x,
            y: position.y,
            frame_index,
            timestamp_ms: timestamp_ms.max(0.0),
        }
    }

    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// The single best estimate of the bar's location in one frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarbellPathPoint {
    pub frame_index: u32,
    pub timestamp_ms: f64,
    pub x: f64,
    pub y: f64,
    /// Raw points that supported this estimate.
    pub support: usize,
}

impl BarbellPathPoint {
    pub fn position(&self) -> Point2 {
        Point2::new(self.x, self.y)
    }
}

/// A run of frames with no observations between two path points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathGap {
    /// Last frame with an estimate before the gap.
    pub after_frame: u32,
    /// First frame with an estimate after the gap.
    pub before_frame: u32,
}

impl PathGap {
    /// Number of frames that had no estimate.
    pub fn missing_frames(&self) -> u32 {
        self.before_frame.saturating_sub(self.after_frame).saturating_sub(1)
    }
}

/// Output of path reconstruction: estimates ordered by frame plus the
/// explicit list of skipped stretches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconstructedPath {
    pub points: Vec<BarbellPathPoint>,
    pub gaps: Vec<PathGap>,
}

impl ReconstructedPath {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Append a point, recording a gap when frames were skipped.
    ///
    /// Points must arrive in strictly increasing frame order; anything else
    /// is ignored and `false` is returned.
    pub fn push(&mut self, point: BarbellPathPoint) -> bool {
        if let Some(last) = self.points.last() {
            if point.frame_index <= last.frame_index {
                return false;
            }
            if point.frame_index > last.frame_index + 1 {
                self.gaps.push(PathGap {
                    after_frame: last.frame_index,
                    before_frame: point.frame_index,
                });
            }
        }
        self.points.push(point);
        true
    }

    /// Total frames covered by gaps.
    pub fn missing_frames(&self) -> u32 {
        self.gaps.iter().map(PathGap::missing_frames).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(frame: u32) -> BarbellPathPoint {
        BarbellPathPoint {
            frame_index: frame,
            timestamp_ms: frame as f64 * 100.0,
            x: 0.0,
            y: 0.0,
            support: 1,
        }
    }

    #[test]
    fn test_push_records_gaps() {
        let mut path = ReconstructedPath::default();
        assert!(path.push(point(0)));
        assert!(path.push(point(1)));
        assert!(path.push(point(5)));
        assert_eq!(path.gaps, vec![PathGap { after_frame: 1, before_frame: 5 }]);
        assert_eq!(path.missing_frames(), 3);
    }

    #[test]
    fn test_push_rejects_out_of_order() {
        let mut path = ReconstructedPath::default();
        path.push(point(3));
        assert!(!path.push(point(3)));
        assert!(!path.push(point(2)));
        assert_eq!(path.len(), 1);
    }

    #[test]
    fn test_negative_timestamp_clamped() {
        let p = TrackedPoint::new(Point2::new(1.0, 2.0), 0, -5.0);
        assert_eq!(p.timestamp_ms, 0.0);
    }
}
