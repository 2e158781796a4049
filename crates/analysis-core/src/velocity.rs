//! Velocity analysis over a reconstructed bar path.
//!
//! Converts pixel displacement between consecutive path points into m/s
//! using the session calibration, finds the concentric (lifting) phase and
//! derives the summary metrics reported to the caller.

use barpath_common::clock::ms_to_secs;
use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{
    AnalysisResult, CalibrationResult, ConcentricPhase, LiftDirection, ReconstructedPath,
    VelocityProfile, VerticalDirection,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::smoothing::{smooth, SmoothingAlgorithm};
use crate::zones::PowerZoneTable;

/// Configuration for the velocity analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VelocityConfig {
    /// Speeds below this never count toward the concentric phase (m/s).
    pub noise_floor_mps: f64,

    /// Smoothing applied to the instantaneous series.
    pub smoothing: SmoothingAlgorithm,

    /// Hard plausibility ceiling; faster intervals are clamped (m/s).
    pub max_velocity_mps: f64,

    /// Intervals faster than this are logged as suspicious (m/s).
    pub warn_velocity_mps: f64,

    /// Intervals spanning more sample periods than this are excluded.
    pub max_gap_frames: u32,

    pub lift_direction: LiftDirection,

    pub zones: PowerZoneTable,
}

impl Default for VelocityConfig {
    fn default() -> Self {
        Self {
            noise_floor_mps: 0.05,
            smoothing: SmoothingAlgorithm::default(),
            max_velocity_mps: 10.0,
            warn_velocity_mps: 5.0,
            max_gap_frames: 5,
            lift_direction: LiftDirection::Auto,
            zones: PowerZoneTable::default(),
        }
    }
}

impl VelocityConfig {
    pub fn validate(&self) -> BarpathResult<()> {
        if !(self.noise_floor_mps.is_finite() && self.noise_floor_mps >= 0.0) {
            return Err(BarpathError::config("noise_floor_mps must be >= 0"));
        }
        if !(self.max_velocity_mps.is_finite() && self.max_velocity_mps > self.noise_floor_mps) {
            return Err(BarpathError::config(
                "max_velocity_mps must be finite and above the noise floor",
            ));
        }
        if self.max_gap_frames == 0 {
            return Err(BarpathError::config("max_gap_frames must be at least 1"));
        }
        self.zones.validate()
    }
}

/// One accepted step between two consecutive path points.
#[derive(Debug, Clone, Copy)]
struct Interval {
    /// Index into `path.points` of the earlier point.
    from: usize,
    to: usize,
    dy_px: f64,
    speed_mps: f64,
}

/// The velocity analyzer.
pub struct VelocityAnalyzer {
    config: VelocityConfig,
}

impl VelocityAnalyzer {
    pub fn new(config: VelocityConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(VelocityConfig::default())
    }

    pub fn config(&self) -> &VelocityConfig {
        &self.config
    }

    /// Analyze a finalized path sampled at `sample_rate_hz`.
    pub fn analyze(
        &self,
        path: &ReconstructedPath,
        calibration: &CalibrationResult,
        sample_rate_hz: f64,
    ) -> BarpathResult<AnalysisResult> {
        if path.len() < 2 {
            return Err(BarpathError::analysis(format!(
                "need at least two path points, got {}",
                path.len()
            )));
        }
        if !(sample_rate_hz.is_finite() && sample_rate_hz > 0.0) {
            return Err(BarpathError::analysis(format!(
                "invalid sample rate {sample_rate_hz}"
            )));
        }

        let mut intervals = self.intervals(path, calibration, sample_rate_hz);
        let raw: Vec<f64> = intervals.iter().map(|i| i.speed_mps).collect();
        let smoothed = smooth(&raw, self.config.smoothing);
        for (interval, v) in intervals.iter_mut().zip(&smoothed) {
            interval.speed_mps = finite_or_zero(*v);
        }

        let direction = self.lift_direction(path);
        let run = self.concentric_run(&intervals, direction);

        let (phase, phase_intervals) = match run {
            Some((start, end)) => {
                let first = &intervals[start];
                let last = &intervals[end];
                (
                    ConcentricPhase {
                        start_frame: path.points[first.from].frame_index,
                        end_frame: path.points[last.to].frame_index,
                        detected: true,
                    },
                    &intervals[start..=end],
                )
            }
            None => {
                tracing::info!("No concentric phase detected, using whole path");
                (
                    ConcentricPhase {
                        start_frame: path.points[0].frame_index,
                        end_frame: path.points[path.len() - 1].frame_index,
                        detected: false,
                    },
                    &intervals[..],
                )
            }
        };

        let mean = if phase_intervals.is_empty() {
            0.0
        } else {
            phase_intervals.iter().map(|i| i.speed_mps).sum::<f64>() / phase_intervals.len() as f64
        };
        let peak = intervals
            .iter()
            .map(|i| i.speed_mps)
            .fold(0.0f64, f64::max);

        let concentric_duration_s = match (phase_intervals.first(), phase_intervals.last()) {
            (Some(first), Some(last)) => {
                ms_to_secs(path.points[last.to].timestamp_ms - path.points[first.from].timestamp_ms)
            }
            _ => 0.0,
        };
        let rep_duration_s = ms_to_secs(
            path.points[path.len() - 1].timestamp_ms - path.points[0].timestamp_ms,
        );

        let power_zone = self.config.zones.classify(mean);
        let result = AnalysisResult {
            velocity: VelocityProfile {
                instantaneous: intervals.iter().map(|i| i.speed_mps).collect(),
                mean: finite_or_zero(mean),
                peak: finite_or_zero(peak),
            },
            concentric_phase: phase,
            path_deviation_mm: finite_or_zero(calibration.px_to_mm(path_deviation_px(path))),
            range_of_motion_mm: finite_or_zero(calibration.px_to_mm(range_of_motion_px(path))),
            power_zone,
            lift_direction: direction,
            concentric_duration_s: finite_or_zero(concentric_duration_s.max(0.0)),
            rep_duration_s: finite_or_zero(rep_duration_s.max(0.0)),
            sample_rate_hz,
            calibration: *calibration,
            path: path.clone(),
            analyzed_at: Utc::now(),
        };

        tracing::info!(
            mean_mps = result.velocity.mean,
            peak_mps = result.velocity.peak,
            rom_mm = result.range_of_motion_mm,
            zone = %result.power_zone,
            detected = result.concentric_phase.detected,
            "Velocity analysis complete"
        );
        Ok(result)
    }

    fn intervals(
        &self,
        path: &ReconstructedPath,
        calibration: &CalibrationResult,
        sample_rate_hz: f64,
    ) -> Vec<Interval> {
        let max_span = self.config.max_gap_frames as f64 + 0.5;
        let mut out = Vec::with_capacity(path.len().saturating_sub(1));

        for (i, pair) in path.points.windows(2).enumerate() {
            let (a, b) = (&pair[0], &pair[1]);
            let dt_s = ms_to_secs(b.timestamp_ms - a.timestamp_ms);
            if !dt_s.is_finite() || dt_s <= 0.0 {
                tracing::debug!(frame = b.frame_index, dt_s, "Skipping non-positive interval");
                continue;
            }
            if dt_s * sample_rate_hz > max_span {
                tracing::debug!(
                    from = a.frame_index,
                    to = b.frame_index,
                    "Skipping interval across tracking gap"
                );
                continue;
            }

            let distance_px = a.position().distance(&b.position());
            let mut speed = calibration.px_to_mm(distance_px) / 1000.0 / dt_s;
            if !speed.is_finite() {
                continue;
            }
            if speed > self.config.warn_velocity_mps {
                tracing::warn!(
                    frame = b.frame_index,
                    speed_mps = speed,
                    "Implausible bar velocity"
                );
            }
            if speed > self.config.max_velocity_mps {
                speed = self.config.max_velocity_mps;
            }

            out.push(Interval {
                from: i,
                to: i + 1,
                dy_px: b.y - a.y,
                speed_mps: speed,
            });
        }
        out
    }

    fn lift_direction(&self, path: &ReconstructedPath) -> VerticalDirection {
        match self.config.lift_direction {
            LiftDirection::Up => VerticalDirection::Up,
            LiftDirection::Down => VerticalDirection::Down,
            LiftDirection::Auto => {
                let (Some(first), Some(last)) = (path.points.first(), path.points.last()) else {
                    return VerticalDirection::Up;
                };
                let net = last.y - first.y;
                let range = range_of_motion_px(path);
                if range > 0.0 && net.abs() > 0.1 * range && net > 0.0 {
                    VerticalDirection::Down
                } else {
                    VerticalDirection::Up
                }
            }
        }
    }

    /// Longest run of adjacent intervals moving in `direction` above the
    /// noise floor, as inclusive indices into `intervals`. Ties go to the
    /// run covering more vertical distance.
    fn concentric_run(
        &self,
        intervals: &[Interval],
        direction: VerticalDirection,
    ) -> Option<(usize, usize)> {
        let qualifies = |i: &Interval| {
            direction.matches(i.dy_px) && i.speed_mps >= self.config.noise_floor_mps
        };

        let mut best: Option<(usize, usize, f64)> = None;
        let mut current: Option<(usize, f64)> = None;

        for (idx, interval) in intervals.iter().enumerate() {
            let continues = idx > 0 && intervals[idx - 1].to == interval.from;
            current = match (qualifies(interval), current) {
                (true, Some((start, travel))) if continues => {
                    Some((start, travel + interval.dy_px.abs()))
                }
                (true, _) => Some((idx, interval.dy_px.abs())),
                (false, _) => None,
            };
            if let Some((start, travel)) = current {
                let len = idx - start;
                let better = match best {
                    None => true,
                    Some((bs, be, bt)) => len > be - bs || (len == be - bs && travel > bt),
                };
                if better {
                    best = Some((start, idx, travel));
                }
            }
        }
        best.map(|(s, e, _)| (s, e))
    }
}

fn range_of_motion_px(path: &ReconstructedPath) -> f64 {
    let (min, max) = path
        .points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.y), hi.max(p.y))
        });
    if max >= min {
        max - min
    } else {
        0.0
    }
}

fn path_deviation_px(path: &ReconstructedPath) -> f64 {
    if path.is_empty() {
        return 0.0;
    }
    let n = path.len() as f64;
    let mean_x = path.points.iter().map(|p| p.x).sum::<f64>() / n;
    let variance = path
        .points
        .iter()
        .map(|p| (p.x - mean_x).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt()
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barpath_motion_model::{BarbellPathPoint, CalibrationMethod, PowerZone};
    use proptest::prelude::*;

    fn path_of(points: &[(f64, f64)], dt_ms: f64) -> ReconstructedPath {
        let mut path = ReconstructedPath::default();
        for (i, (x, y)) in points.iter().enumerate() {
            path.push(BarbellPathPoint {
                frame_index: i as u32,
                timestamp_ms: i as f64 * dt_ms,
                x: *x,
                y: *y,
                support: 3,
            });
        }
        path
    }

    fn unit_scale() -> CalibrationResult {
        CalibrationResult::new(1.0, CalibrationMethod::KnownScale, 1.0).unwrap()
    }

    #[test]
    fn test_too_short_path_errors() {
        let path = path_of(&[(0.0, 0.0)], 100.0);
        let err = VelocityAnalyzer::with_defaults()
            .analyze(&path, &unit_scale(), 10.0)
            .unwrap_err();
        assert!(matches!(err, BarpathError::Analysis { .. }));
    }

    #[test]
    fn test_upward_lift_detected() {
        // 1 px/mm, 100 ms steps: 50 px per step = 0.5 m/s.
        let ys = [500.0, 450.0, 400.0, 350.0, 300.0];
        let points: Vec<(f64, f64)> = ys.iter().map(|y| (100.0, *y)).collect();
        let result = VelocityAnalyzer::with_defaults()
            .analyze(&path_of(&points, 100.0), &unit_scale(), 10.0)
            .unwrap();
        assert_eq!(result.lift_direction, VerticalDirection::Up);
        assert!(result.concentric_phase.detected);
        assert_eq!(result.concentric_phase.start_frame, 0);
        assert_eq!(result.concentric_phase.end_frame, 4);
        assert!((result.velocity.mean - 0.5).abs() < 1e-9);
        assert_eq!(result.range_of_motion_mm, 200.0);
        assert_eq!(result.path_deviation_mm, 0.0);
        assert!((result.concentric_duration_s - 0.4).abs() < 1e-9);
        assert_eq!(result.power_zone, PowerZone::AcceleratingStrength);
    }

    #[test]
    fn test_concentric_phase_skips_eccentric() {
        // Down 3 steps (eccentric), then up 4 steps with an explicit Up lift.
        let ys = [300.0, 330.0, 360.0, 390.0, 350.0, 310.0, 270.0, 230.0];
        let points: Vec<(f64, f64)> = ys.iter().map(|y| (0.0, *y)).collect();
        let analyzer = VelocityAnalyzer::new(VelocityConfig {
            lift_direction: LiftDirection::Up,
            smoothing: SmoothingAlgorithm::None,
            ..VelocityConfig::default()
        });
        let result = analyzer
            .analyze(&path_of(&points, 100.0), &unit_scale(), 10.0)
            .unwrap();
        assert_eq!(result.concentric_phase.start_frame, 3);
        assert_eq!(result.concentric_phase.end_frame, 7);
        assert!((result.velocity.mean - 0.4).abs() < 1e-9);
        assert_eq!(result.velocity.instantaneous.len(), 7);
    }

    #[test]
    fn test_stationary_bar_has_no_phase() {
        let points = vec![(100.0, 100.0); 6];
        let result = VelocityAnalyzer::with_defaults()
            .analyze(&path_of(&points, 66.0), &unit_scale(), 15.0)
            .unwrap();
        assert!(!result.concentric_phase.detected);
        assert_eq!(result.concentric_phase.start_frame, 0);
        assert_eq!(result.concentric_phase.end_frame, 5);
        assert_eq!(result.velocity.mean, 0.0);
        assert_eq!(result.velocity.peak, 0.0);
    }

    #[test]
    fn test_velocity_ceiling_clamps() {
        // 5000 px in 100 ms at 1 px/mm = 50 m/s.
        let points = vec![(0.0, 5000.0), (0.0, 0.0)];
        let result = VelocityAnalyzer::with_defaults()
            .analyze(&path_of(&points, 100.0), &unit_scale(), 10.0)
            .unwrap();
        assert_eq!(result.velocity.peak, 10.0);
    }

    #[test]
    fn test_zero_dt_interval_excluded() {
        let points = vec![(0.0, 100.0), (0.0, 50.0), (0.0, 0.0)];
        let result = VelocityAnalyzer::with_defaults()
            .analyze(&path_of(&points, 0.0), &unit_scale(), 10.0)
            .unwrap();
        assert!(result.velocity.instantaneous.is_empty());
        assert_eq!(result.velocity.mean, 0.0);
    }

    #[test]
    fn test_gap_interval_excluded() {
        let mut path = ReconstructedPath::default();
        for (frame, y) in [(0u32, 300.0), (1, 280.0), (20, 100.0), (21, 80.0)] {
            path.push(BarbellPathPoint {
                frame_index: frame,
                timestamp_ms: frame as f64 * 100.0,
                x: 0.0,
                y,
                support: 1,
            });
        }
        let analyzer = VelocityAnalyzer::new(VelocityConfig {
            smoothing: SmoothingAlgorithm::None,
            ..VelocityConfig::default()
        });
        let result = analyzer.analyze(&path, &unit_scale(), 10.0).unwrap();
        assert_eq!(result.velocity.instantaneous.len(), 2);
        assert!(result.velocity.instantaneous.iter().all(|v| (v - 0.2).abs() < 1e-9));
    }

    #[test]
    fn test_invalid_sample_rate() {
        let path = path_of(&[(0.0, 0.0), (0.0, 10.0)], 100.0);
        assert!(VelocityAnalyzer::with_defaults()
            .analyze(&path, &unit_scale(), 0.0)
            .is_err());
    }

    proptest! {
        #[test]
        fn prop_metrics_always_finite(
            ys in proptest::collection::vec(-1.0e4f64..1.0e4, 2..40),
            dt_ms in 1.0f64..500.0,
            pixels_per_mm in 0.01f64..10.0,
            rate in 1.0f64..120.0,
        ) {
            let points: Vec<(f64, f64)> = ys.iter().enumerate().map(|(i, y)| (i as f64, *y)).collect();
            let scale = CalibrationResult::new(pixels_per_mm, CalibrationMethod::Manual, 1.0).unwrap();
            let result = VelocityAnalyzer::with_defaults()
                .analyze(&path_of(&points, dt_ms), &scale, rate)
                .unwrap();
            prop_assert!(result.velocity.mean.is_finite());
            prop_assert!(result.velocity.peak.is_finite());
            prop_assert!(result.velocity.peak <= 10.0);
            prop_assert!(result.velocity.mean <= result.velocity.peak + 1e-9);
            prop_assert!(result.velocity.instantaneous.iter().all(|v| v.is_finite() && *v >= 0.0));
            prop_assert!(result.range_of_motion_mm.is_finite() && result.range_of_motion_mm >= 0.0);
            prop_assert!(result.path_deviation_mm.is_finite());
            prop_assert!(result.concentric_duration_s.is_finite());
            prop_assert!(result.rep_duration_s >= result.concentric_duration_s - 1e-9);
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(VelocityConfig::default().validate().is_ok());
        let bad = VelocityConfig {
            max_gap_frames: 0,
            ..VelocityConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
