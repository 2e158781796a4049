//! Pixel-to-millimeter calibration results.

use barpath_common::error::{BarpathError, BarpathResult};
use serde::{Deserialize, Serialize};

use crate::hints::clamp_confidence;

/// How a calibration scale was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// A user-drawn line of known length.
    Manual,
    /// A weight plate of known diameter detected in the frame.
    Plate,
    /// Scale proposed by the hint service.
    AiDetected,
    /// A plate diameter already measured in pixels by the caller.
    KnownScale,
}

impl CalibrationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Plate => "plate",
            Self::AiDetected => "ai_detected",
            Self::KnownScale => "known_scale",
        }
    }
}

/// A resolved scale factor. Immutable once created.
///
/// `pixels_per_mm` is always finite and positive and `confidence` is
/// always within `[0, 1]`; deserialization goes through the same checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCalibration")]
pub struct CalibrationResult {
    pixels_per_mm: f64,
    method: CalibrationMethod,
    confidence: f64,
}

#[derive(Deserialize)]
struct RawCalibration {
    pixels_per_mm: f64,
    method: CalibrationMethod,
    confidence: f64,
}

impl TryFrom<RawCalibration> for CalibrationResult {
    type Error = BarpathError;

    fn try_from(raw: RawCalibration) -> Result<Self, Self::Error> {
        Self::new(raw.pixels_per_mm, raw.method, raw.confidence)
    }
}

impl CalibrationResult {
    /// Validate and build. Confidence outside `[0, 1]` is clamped; a
    /// non-positive or non-finite scale is rejected.
    pub fn new(
        pixels_per_mm: f64,
        method: CalibrationMethod,
        confidence: f64,
    ) -> BarpathResult<Self> {
        if !(pixels_per_mm.is_finite() && pixels_per_mm > 0.0) {
            return Err(BarpathError::calibration(format!(
                "scale must be positive and finite, got {pixels_per_mm}"
            )));
        }
        Ok(Self {
            pixels_per_mm,
            method,
            confidence: clamp_confidence(confidence),
        })
    }

    /// Scale from a reference of `observed_px` pixels that is `physical_mm` long.
    pub fn from_reference(
        observed_px: f64,
        physical_mm: f64,
        method: CalibrationMethod,
        confidence: f64,
    ) -> BarpathResult<Self> {
        if !(physical_mm.is_finite() && physical_mm > 0.0) {
            return Err(BarpathError::calibration(format!(
                "reference size must be positive, got {physical_mm} mm"
            )));
        }
        Self::new(observed_px / physical_mm, method, confidence)
    }

    pub fn pixels_per_mm(&self) -> f64 {
        self.pixels_per_mm
    }

    pub fn method(&self) -> CalibrationMethod {
        self.method
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Convert a pixel length to millimeters.
    pub fn px_to_mm(&self, px: f64) -> f64 {
        px / self.pixels_per_mm
    }
}
