//! Calibration resolution: turning a reference into a pixels-per-mm scale.

use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{CalibrationHint, CalibrationMethod, CalibrationResult, Point2};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::plate::{PlateEstimator, PlateEstimatorConfig};

/// Standard Olympic plate diameter in millimeters.
pub const OLYMPIC_PLATE_DIAMETER_MM: f64 = 450.0;

/// Which reference the scale comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalibrationMode {
    /// Detect a plate of `plate_diameter_mm` in the reference frame.
    #[default]
    Plate,
    /// A line drawn by the user between two points of known separation.
    Manual {
        start: Point2,
        end: Point2,
        length_mm: f64,
    },
    /// The plate's diameter was already measured in pixels.
    KnownDiameter { diameter_px: f64 },
}

/// Settings supplied with `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationSettings {
    pub mode: CalibrationMode,
    pub plate_diameter_mm: f64,
    /// Consult a calibration hint when one is supplied.
    pub use_hint: bool,
    /// Hints at or below this confidence are ignored.
    pub hint_min_confidence: f64,
    pub estimator: PlateEstimatorConfig,
}

impl Default for CalibrationSettings {
    fn default() -> Self {
        Self {
            mode: CalibrationMode::Plate,
            plate_diameter_mm: OLYMPIC_PLATE_DIAMETER_MM,
            use_hint: true,
            hint_min_confidence: 0.4,
            estimator: PlateEstimatorConfig::default(),
        }
    }
}

/// Resolves a [`CalibrationResult`] from settings, a reference frame and
/// an optional hint.
#[derive(Debug, Clone)]
pub struct CalibrationResolver {
    settings: CalibrationSettings,
    estimator: PlateEstimator,
}

impl CalibrationResolver {
    pub fn new(settings: CalibrationSettings) -> Self {
        let estimator = PlateEstimator::new(settings.estimator.clone());
        Self {
            settings,
            estimator,
        }
    }

    pub fn settings(&self) -> &CalibrationSettings {
        &self.settings
    }

    /// Resolve the scale.
    ///
    /// Explicit modes (`Manual`, `KnownDiameter`) always win. In `Plate`
    /// mode a sufficiently confident hint is used directly; otherwise the
    /// deterministic estimator runs and its failure is the only way this
    /// returns `Calibration` errors.
    pub fn resolve(
        &self,
        gray: &GrayImage,
        hint: Option<&CalibrationHint>,
    ) -> BarpathResult<CalibrationResult> {
        match &self.settings.mode {
            CalibrationMode::Manual {
                start,
                end,
                length_mm,
            } => {
                let px = start.distance(end);
                if px <= 0.0 {
                    return Err(BarpathError::calibration(
                        "manual calibration line has zero length",
                    ));
                }
                CalibrationResult::from_reference(px, *length_mm, CalibrationMethod::Manual, 1.0)
            }
            CalibrationMode::KnownDiameter { diameter_px } => CalibrationResult::from_reference(
                *diameter_px,
                self.settings.plate_diameter_mm,
                CalibrationMethod::KnownScale,
                1.0,
            ),
            CalibrationMode::Plate => {
                if let Some(result) = hint.and_then(|h| self.from_hint(h)) {
                    return Ok(result);
                }
                self.from_plate(gray)
            }
        }
    }

    /// Accept a hint only if enabled, confident enough, and yielding a valid scale.
    fn from_hint(&self, hint: &CalibrationHint) -> Option<CalibrationResult> {
        if !self.settings.use_hint {
            return None;
        }
        if hint.confidence <= self.settings.hint_min_confidence {
            tracing::info!(
                confidence = hint.confidence,
                threshold = self.settings.hint_min_confidence,
                "Calibration hint below threshold, using plate estimator"
            );
            return None;
        }
        let scale = hint.pixels_per_mm.or_else(|| {
            hint.plate_diameter_px
                .map(|d| d / self.settings.plate_diameter_mm)
        })?;
        match CalibrationResult::new(scale, CalibrationMethod::AiDetected, hint.confidence) {
            Ok(result) => {
                tracing::info!(
                    pixels_per_mm = result.pixels_per_mm(),
                    confidence = result.confidence(),
                    "Using calibration hint"
                );
                Some(result)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding invalid calibration hint");
                None
            }
        }
    }

    fn from_plate(&self, gray: &GrayImage) -> BarpathResult<CalibrationResult> {
        let plate = self.estimator.detect(gray).ok_or_else(|| {
            BarpathError::calibration("no plausible plate found in reference frame")
        })?;
        tracing::info!(
            diameter_px = plate.diameter_px(),
            support = plate.support,
            "Plate detected"
        );
        CalibrationResult::from_reference(
            plate.diameter_px(),
            self.settings.plate_diameter_mm,
            CalibrationMethod::Plate,
            plate.support,
        )
    }
}
