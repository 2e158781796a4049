//! Advisory proposals from an external detector.
//!
//! Hints never replace the deterministic path; consumers compare the
//! confidence against their own threshold and fall back when it is low.

use serde::{Deserialize, Serialize};

use crate::geometry::Region;

/// Proposed barbell region in full-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionHint {
    pub region: Region,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
}

impl RegionHint {
    pub fn new(region: Region, confidence: f64) -> Self {
        Self {
            region,
            confidence: clamp_confidence(confidence),
        }
    }
}

/// Proposed calibration scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationHint {
    /// Directly proposed scale, if the detector produced one.
    pub pixels_per_mm: Option<f64>,
    /// Plate diameter in pixels, if the detector measured a plate instead.
    pub plate_diameter_px: Option<f64>,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f64,
    /// Free-text explanation from the detector.
    #[serde(default)]
    pub description: Option<String>,
}

impl CalibrationHint {
    pub fn from_scale(pixels_per_mm: f64, confidence: f64) -> Self {
        Self {
            pixels_per_mm: Some(pixels_per_mm),
            plate_diameter_px: None,
            confidence: clamp_confidence(confidence),
            description: None,
        }
    }
}

/// Map any reported confidence into `[0, 1]`; non-finite becomes 0.
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(clamp_confidence(1.7), 1.0);
        assert_eq!(clamp_confidence(-0.2), 0.0);
        assert_eq!(clamp_confidence(f64::NAN), 0.0);
        let hint = RegionHint::new(Region::new(0.0, 0.0, 10.0, 10.0), 2.0);
        assert_eq!(hint.confidence, 1.0);
    }
}
