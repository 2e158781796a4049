//! Feature sets and the strict-then-relaxed detection policy.

use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{FrameDimensions, Point2, Region, RegionHint};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::corners::{good_features_to_track, DetectionPass};
use crate::mask::{ForegroundMaskConfig, HintMaskConfig, WeightMask};
use crate::plane::gray_dimensions;

/// Detection tuning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DetectionConfig {
    pub strict: DetectionPass,
    pub relaxed: DetectionPass,
    /// Pass used when re-seeding after loss or a resize.
    pub reinit: DetectionPass,
    /// Strict results below this count trigger the relaxed retry.
    pub min_features: usize,
    /// Region hints at or below this confidence are ignored.
    pub hint_min_confidence: f64,
    pub foreground: ForegroundMaskConfig,
    pub hint_mask: HintMaskConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            strict: DetectionPass::STRICT,
            relaxed: DetectionPass::RELAXED,
            reinit: DetectionPass::REINIT,
            min_features: 5,
            hint_min_confidence: 0.4,
            foreground: ForegroundMaskConfig::default(),
            hint_mask: HintMaskConfig::default(),
        }
    }
}

/// The points currently being tracked, tagged with the frame size they
/// belong to. Never mixes coordinates from two frame sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    dimensions: FrameDimensions,
    points: Vec<Point2>,
}

impl FeatureSet {
    pub fn new(dimensions: FrameDimensions, points: Vec<Point2>) -> Self {
        Self { dimensions, points }
    }

    pub fn dimensions(&self) -> FrameDimensions {
        self.dimensions
    }

    pub fn points(&self) -> &[Point2] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Keep at most `max` points (strongest first, as detected).
    pub fn truncate(&mut self, max: usize) {
        self.points.truncate(max);
    }
}

/// Where the detection weights come from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaskSource {
    /// Center-weighted ellipse.
    Foreground,
    /// Soft falloff around a hinted region.
    Hint(RegionHint),
    /// Hard rectangle chosen by the user.
    Rectangle(Region),
    /// Whole frame at full weight.
    Uniform,
}

/// Which pass produced the final result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStage {
    Strict,
    Relaxed,
}

/// Outcome of a detection attempt, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutcome {
    pub features: FeatureSet,
    pub stage: DetectionStage,
    /// Corners found by the strict pass.
    pub strict_count: usize,
    /// Corners found by the relaxed pass, if it ran.
    pub relaxed_count: Option<usize>,
}

/// Runs corner detection with the configured masks and retry policy.
#[derive(Debug, Clone)]
pub struct FeatureDetector {
    config: DetectionConfig,
}

impl FeatureDetector {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(DetectionConfig::default())
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Build the weight mask for `source`. Low-confidence hints degrade to
    /// the foreground ellipse.
    pub fn build_mask(&self, dimensions: FrameDimensions, source: &MaskSource) -> WeightMask {
        match source {
            MaskSource::Foreground => {
                WeightMask::foreground_ellipse(dimensions, &self.config.foreground)
            }
            MaskSource::Hint(hint) if hint.confidence > self.config.hint_min_confidence => {
                WeightMask::region_falloff(dimensions, &hint.region, &self.config.hint_mask)
            }
            MaskSource::Hint(hint) => {
                tracing::debug!(
                    confidence = hint.confidence,
                    threshold = self.config.hint_min_confidence,
                    "Region hint below threshold, using foreground mask"
                );
                WeightMask::foreground_ellipse(dimensions, &self.config.foreground)
            }
            MaskSource::Rectangle(region) => WeightMask::rectangle(dimensions, region),
            MaskSource::Uniform => WeightMask::uniform(dimensions),
        }
    }

    /// Strict pass under `source`, then one relaxed retry if it found fewer
    /// than `min_features`. The relaxed pass covers the whole frame except
    /// for an explicit rectangle, which stays binding.
    pub fn detect_with_fallback(&self, gray: &GrayImage, source: &MaskSource) -> DetectionOutcome {
        let dimensions = gray_dimensions(gray);
        let mask = self.build_mask(dimensions, source);
        let strict = good_features_to_track(gray, &mask, &self.config.strict);
        let strict_count = strict.len();

        if strict_count >= self.config.min_features {
            return DetectionOutcome {
                features: FeatureSet::new(dimensions, strict),
                stage: DetectionStage::Strict,
                strict_count,
                relaxed_count: None,
            };
        }

        let relaxed_mask = match source {
            MaskSource::Rectangle(_) => mask,
            _ => self.build_mask(dimensions, &MaskSource::Uniform),
        };
        let relaxed = good_features_to_track(gray, &relaxed_mask, &self.config.relaxed);
        let relaxed_count = relaxed.len();
        tracing::debug!(
            strict_count,
            relaxed_count,
            min = self.config.min_features,
            "Strict detection below minimum, relaxed retry"
        );

        // Keep whichever pass produced more.
        let (points, stage) = if relaxed_count >= strict_count {
            (relaxed, DetectionStage::Relaxed)
        } else {
            (strict, DetectionStage::Strict)
        };
        DetectionOutcome {
            features: FeatureSet::new(dimensions, points),
            stage,
            strict_count,
            relaxed_count: Some(relaxed_count),
        }
    }

    /// Detect for session start; zero points after both passes is an error.
    pub fn detect(&self, gray: &GrayImage, source: &MaskSource) -> BarpathResult<FeatureSet> {
        let outcome = self.detect_with_fallback(gray, source);
        if outcome.features.is_empty() {
            return Err(BarpathError::no_features(format!(
                "strict pass found {}, relaxed pass found {}",
                outcome.strict_count,
                outcome.relaxed_count.unwrap_or(0)
            )));
        }
        tracing::info!(
            count = outcome.features.len(),
            stage = ?outcome.stage,
            "Features detected"
        );
        Ok(outcome.features)
    }

    /// Re-seed without any hint, using the reinit pass over the whole frame.
    pub fn redetect(&self, gray: &GrayImage) -> BarpathResult<FeatureSet> {
        let dimensions = gray_dimensions(gray);
        let mask = self.build_mask(dimensions, &MaskSource::Uniform);
        let points = good_features_to_track(gray, &mask, &self.config.reinit);
        if points.is_empty() {
            return Err(BarpathError::no_features("reinitialization found no corners"));
        }
        Ok(FeatureSet::new(dimensions, points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    fn centered_square(w: u32, h: u32, side: u32) -> GrayImage {
        let mut img = GrayImage::from_pixel(w, h, Luma([30]));
        let x = (w - side) as i32 / 2;
        let y = (h - side) as i32 / 2;
        draw_filled_rect_mut(&mut img, Rect::at(x, y).of_size(side, side), Luma([220]));
        img
    }

    #[test]
    fn test_high_contrast_object_in_center_mask() {
        let detector = FeatureDetector::with_defaults();
        let img = centered_square(320, 240, 60);
        let outcome = detector.detect_with_fallback(&img, &MaskSource::Foreground);
        assert!(outcome.strict_count >= 1);
        assert!(!outcome.features.is_empty());
    }

    #[test]
    fn test_blank_frame_exercises_relaxed_retry() {
        let detector = FeatureDetector::with_defaults();
        let img = GrayImage::from_pixel(320, 240, Luma([90]));
        let outcome = detector.detect_with_fallback(&img, &MaskSource::Foreground);
        assert_eq!(outcome.strict_count, 0);
        assert_eq!(outcome.relaxed_count, Some(0));
        assert!(outcome.features.is_empty());

        let err = detector.detect(&img, &MaskSource::Foreground).unwrap_err();
        assert!(matches!(err, BarpathError::NoFeaturesDetected { .. }));
    }

    #[test]
    fn test_few_strict_corners_trigger_relaxed() {
        // Four corners, below the default minimum of five.
        let detector = FeatureDetector::with_defaults();
        let img = centered_square(320, 240, 60);
        let outcome = detector.detect_with_fallback(&img, &MaskSource::Foreground);
        assert!(outcome.strict_count < 5);
        assert!(outcome.relaxed_count.is_some());
        assert!(outcome.features.len() >= outcome.strict_count);
    }

    #[test]
    fn test_low_confidence_hint_uses_foreground() {
        let detector = FeatureDetector::with_defaults();
        let dims = FrameDimensions::new(100, 80);
        let hint = RegionHint::new(Region::new(0.0, 0.0, 10.0, 10.0), 0.1);
        assert_eq!(
            detector.build_mask(dims, &MaskSource::Hint(hint)),
            detector.build_mask(dims, &MaskSource::Foreground)
        );
    }

    #[test]
    fn test_hint_at_threshold_is_rejected() {
        let detector = FeatureDetector::with_defaults();
        let dims = FrameDimensions::new(100, 80);
        let region = Region::new(30.0, 20.0, 20.0, 20.0);
        let foreground = detector.build_mask(dims, &MaskSource::Foreground);

        let at = RegionHint::new(region, detector.config().hint_min_confidence);
        assert_eq!(detector.build_mask(dims, &MaskSource::Hint(at)), foreground);

        let above = RegionHint::new(region, detector.config().hint_min_confidence + 0.01);
        assert_ne!(detector.build_mask(dims, &MaskSource::Hint(above)), foreground);
    }

    #[test]
    fn test_rectangle_stays_binding_on_retry() {
        let detector = FeatureDetector::with_defaults();
        let img = centered_square(320, 240, 60);
        let empty_corner = Region::new(0.0, 0.0, 60.0, 60.0);
        let outcome = detector.detect_with_fallback(&img, &MaskSource::Rectangle(empty_corner));
        assert!(outcome.features.is_empty());
    }

    #[test]
    fn test_redetect_on_blank_fails() {
        let detector = FeatureDetector::with_defaults();
        let img = GrayImage::from_pixel(64, 64, Luma([0]));
        assert!(detector.redetect(&img).is_err());
        let img = centered_square(128, 96, 30);
        assert!(!detector.redetect(&img).unwrap().is_empty());
    }
}
