//! Velocity analysis results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationResult;
use crate::tracking::ReconstructedPath;

/// Direction of travel on screen. Image `y` grows downward, so `Up`
/// means decreasing `y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerticalDirection {
    Up,
    Down,
}

impl VerticalDirection {
    /// Whether a vertical pixel delta moves in this direction.
    pub fn matches(&self, dy: f64) -> bool {
        match self {
            Self::Up => dy < 0.0,
            Self::Down => dy > 0.0,
        }
    }
}

/// Which direction counts as the lifting (concentric) direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiftDirection {
    Up,
    Down,
    /// Use the dominant net vertical displacement of the path.
    #[default]
    Auto,
}

/// Training zone classified from mean concentric velocity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerZone {
    AbsoluteStrength,
    AcceleratingStrength,
    StrengthSpeed,
    SpeedStrength,
    StartingStrength,
}

impl PowerZone {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AbsoluteStrength => "absolute strength",
            Self::AcceleratingStrength => "accelerating strength",
            Self::StrengthSpeed => "strength-speed",
            Self::SpeedStrength => "speed-strength",
            Self::StartingStrength => "starting strength",
        }
    }
}

impl std::fmt::Display for PowerZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Velocity series derived from a finalized path. All values in m/s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VelocityProfile {
    /// One value per accepted inter-frame interval.
    pub instantaneous: Vec<f64>,
    /// Mean over the concentric phase.
    pub mean: f64,
    /// Maximum of `instantaneous`.
    pub peak: f64,
}

/// Frame range of the lifting phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcentricPhase {
    pub start_frame: u32,
    pub end_frame: u32,
    /// `false` when no interval qualified and the phase falls back to the whole path.
    pub detected: bool,
}

impl ConcentricPhase {
    pub fn frame_span(&self) -> u32 {
        self.end_frame.saturating_sub(self.start_frame)
    }
}

/// Final output of one analysis run. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub velocity: VelocityProfile,
    pub concentric_phase: ConcentricPhase,
    /// RMS horizontal deviation from the path's mean x, in millimeters.
    pub path_deviation_mm: f64,
    /// Vertical extent of the path, in millimeters.
    pub range_of_motion_mm: f64,
    pub power_zone: PowerZone,
    /// Lifting direction the concentric phase was measured in.
    pub lift_direction: VerticalDirection,
    /// Seconds between the concentric phase boundaries.
    pub concentric_duration_s: f64,
    /// Seconds from the first to the last path sample.
    pub rep_duration_s: f64,
    pub sample_rate_hz: f64,
    pub calibration: CalibrationResult,
    pub path: ReconstructedPath,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// Number of instantaneous samples behind the profile.
    pub fn sample_count(&self) -> usize {
        self.velocity.instantaneous.len()
    }
}
