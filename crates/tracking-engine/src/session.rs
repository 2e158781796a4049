//! Tracking session: calibration, live feature set, and reference frame.
//!
//! A session is driven strictly in order through [`TrackingSession::initialize`],
//! [`TrackingSession::process_frame`], [`TrackingSession::select_region`],
//! [`TrackingSession::reset`] and [`TrackingSession::finalize`]. It is not
//! thread-safe by itself; the worker in [`crate::worker`] gives it a home.

use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{
    CalibrationHint, CalibrationResult, FrameDimensions, Point2, Region, RegionHint, RgbaFrame,
    TrackedPoint,
};
use barpath_vision_core::{
    to_gray, track_points, CalibrationResolver, CalibrationSettings, FeatureDetector, FeatureSet,
    FlowConfig, MaskSource, Pyramid,
};
use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::config::{EngineConfig, TrackingConfig};

/// Lifecycle of a tracking session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No reference frame yet.
    Uninitialized,
    /// Features are live.
    Tracking,
    /// Every feature was lost and re-seeding failed; the next frame retries.
    Lost,
    /// No further frames are accepted until reset.
    Finalized,
}

/// Reply to `initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub feature_count: usize,
    pub calibration: CalibrationResult,
    /// Initial feature positions in the reference frame.
    pub features: Vec<Point2>,
}

/// Counters kept for diagnostics and returned by `finalize`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub points_emitted: u64,
    pub reinitializations: u64,
    pub dimension_changes: u64,
    pub lost_frames: u64,
}

/// Reference frame and the pyramid built from it.
struct Reference {
    gray: GrayImage,
    pyramid: Pyramid,
}

/// Owns all mutable tracking state for one analysis.
pub struct TrackingSession {
    detector: FeatureDetector,
    flow: FlowConfig,
    tracking: TrackingConfig,
    state: SessionState,
    calibration: Option<CalibrationResult>,
    features: Option<FeatureSet>,
    reference: Option<Reference>,
    stats: SessionStats,
}

impl TrackingSession {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            detector: FeatureDetector::new(config.detection.clone()),
            flow: config.flow.clone(),
            tracking: config.tracking.clone(),
            state: SessionState::Uninitialized,
            calibration: None,
            features: None,
            reference: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.calibration.as_ref()
    }

    pub fn feature_count(&self) -> usize {
        self.features.as_ref().map_or(0, FeatureSet::len)
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Start a session on `frame`: resolve calibration and seed features.
    ///
    /// Any previous session state is discarded first. Calibration failures
    /// and an empty initial detection abort the start.
    pub fn initialize(
        &mut self,
        frame: &RgbaFrame,
        settings: &CalibrationSettings,
        calibration_hint: Option<&CalibrationHint>,
        region_hint: Option<&RegionHint>,
    ) -> BarpathResult<InitializeResponse> {
        self.reset();

        let gray = to_gray(frame)?;
        let calibration = CalibrationResolver::new(settings.clone()).resolve(&gray, calibration_hint)?;

        let source = match region_hint {
            Some(hint) => MaskSource::Hint(*hint),
            None => MaskSource::Foreground,
        };
        let mut features = self.detector.detect(&gray, &source)?;
        features.truncate(self.tracking.max_points);
        let pyramid = Pyramid::build(&gray, &self.flow)?;

        tracing::info!(
            width = frame.width(),
            height = frame.height(),
            features = features.len(),
            pixels_per_mm = calibration.pixels_per_mm(),
            method = calibration.method().as_str(),
            "Tracking session initialized"
        );

        let response = InitializeResponse {
            feature_count: features.len(),
            calibration,
            features: features.points().to_vec(),
        };
        self.calibration = Some(calibration);
        self.features = Some(features);
        self.reference = Some(Reference { gray, pyramid });
        self.state = SessionState::Tracking;
        Ok(response)
    }

    /// Track the live features into `frame` and return the survivors.
    ///
    /// An empty result is valid: the bar may be lost, the frame size may
    /// have changed, or features may have just been re-seeded.
    pub fn process_frame(
        &mut self,
        frame: &RgbaFrame,
        frame_index: u32,
        timestamp_ms: f64,
    ) -> BarpathResult<Vec<TrackedPoint>> {
        if matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Finalized
        ) {
            return Err(BarpathError::NotInitialized);
        }

        let gray = to_gray(frame)?;
        let pyramid = Pyramid::build(&gray, &self.flow)?;
        self.stats.frames_processed += 1;

        let reference_dims = self.reference.as_ref().map(|r| r.pyramid.dimensions());
        if reference_dims != Some(pyramid.dimensions()) {
            let reseeded = self.handle_dimension_change(reference_dims, &gray, frame_index);
            self.reference = Some(Reference { gray, pyramid });
            return reseeded.map(|()| Vec::new());
        }

        let Some(features) = self.features.as_ref().filter(|f| !f.is_empty()) else {
            self.stats.lost_frames += 1;
            let reseeded = self.reseed(&gray, frame_index);
            self.reference = Some(Reference { gray, pyramid });
            return reseeded.map(|()| Vec::new());
        };

        let Some(reference) = self.reference.as_ref() else {
            return Err(BarpathError::NotInitialized);
        };
        let flow = track_points(&reference.pyramid, &pyramid, features.points(), &self.flow)?;
        let dims = pyramid.dimensions();
        let survivors: Vec<Point2> = flow
            .positions
            .iter()
            .zip(&flow.status)
            .filter(|(p, ok)| **ok && self.in_bounds(p, dims))
            .map(|(p, _)| *p)
            .take(self.tracking.max_points)
            .collect();

        tracing::trace!(
            frame = frame_index,
            tracked = flow.tracked_count(),
            survivors = survivors.len(),
            "Frame tracked"
        );

        let reseeded = match survivors.len() {
            0 => {
                tracing::debug!(frame = frame_index, "All features lost");
                self.reseed(&gray, frame_index)
            }
            n if n < self.tracking.min_survivors => {
                // Too few to replace the set; keep the previous one.
                Ok(())
            }
            _ => {
                self.features = Some(FeatureSet::new(dims, survivors.clone()));
                Ok(())
            }
        };
        self.reference = Some(Reference { gray, pyramid });
        reseeded?;

        self.stats.points_emitted += survivors.len() as u64;
        Ok(survivors
            .into_iter()
            .map(|p| TrackedPoint::new(p, frame_index, timestamp_ms))
            .collect())
    }

    /// Re-seed features inside an explicit rectangle of the reference frame.
    ///
    /// If nothing is found there the previous feature set is kept. Returns
    /// the live feature count.
    pub fn select_region(&mut self, region: Region) -> BarpathResult<usize> {
        if matches!(
            self.state,
            SessionState::Uninitialized | SessionState::Finalized
        ) {
            return Err(BarpathError::NotInitialized);
        }
        let Some(reference) = self.reference.as_ref() else {
            return Err(BarpathError::NotInitialized);
        };

        let (width, height) = reference.gray.dimensions();
        let region = region.clamp_to(width, height);
        if region.is_empty() {
            tracing::warn!("Selected region lies outside the frame, keeping features");
            return Ok(self.feature_count());
        }

        match self.detector.detect(&reference.gray, &MaskSource::Rectangle(region)) {
            Ok(mut features) => {
                features.truncate(self.tracking.max_points);
                tracing::info!(
                    x = region.x,
                    y = region.y,
                    width = region.width,
                    height = region.height,
                    features = features.len(),
                    "Features re-seeded in selected region"
                );
                self.features = Some(features);
                self.state = SessionState::Tracking;
            }
            Err(e) => {
                tracing::warn!(error = %e, "No features in selected region, keeping previous set");
            }
        }
        Ok(self.feature_count())
    }

    /// Drop all session state.
    pub fn reset(&mut self) {
        if self.state != SessionState::Uninitialized {
            tracing::debug!(state = ?self.state, "Resetting tracking session");
        }
        self.state = SessionState::Uninitialized;
        self.calibration = None;
        self.features = None;
        self.reference = None;
        self.stats = SessionStats::default();
    }

    /// Stop accepting frames. State is kept for inspection until reset.
    pub fn finalize(&mut self) -> BarpathResult<SessionStats> {
        if self.state == SessionState::Uninitialized {
            return Err(BarpathError::NotInitialized);
        }
        self.state = SessionState::Finalized;
        tracing::info!(
            frames = self.stats.frames_processed,
            points = self.stats.points_emitted,
            reinitializations = self.stats.reinitializations,
            "Tracking session finalized"
        );
        Ok(self.stats)
    }

    fn in_bounds(&self, p: &Point2, dims: FrameDimensions) -> bool {
        let margin = self.tracking.edge_buffer_px;
        p.is_finite()
            && p.x >= margin
            && p.y >= margin
            && p.x < dims.width as f64 - margin
            && p.y < dims.height as f64 - margin
    }

    fn handle_dimension_change(
        &mut self,
        previous: Option<FrameDimensions>,
        gray: &GrayImage,
        frame_index: u32,
    ) -> BarpathResult<()> {
        self.stats.dimension_changes += 1;
        if let Some(prev) = previous {
            let (width, height) = gray.dimensions();
            let err = BarpathError::DimensionMismatch {
                expected_width: prev.width,
                expected_height: prev.height,
                width,
                height,
            };
            tracing::warn!(frame = frame_index, error = %err, "Frame size changed, reinitializing");
        }
        self.features = None;
        self.reseed(gray, frame_index)
    }

    /// One reinitialization attempt from `gray`. On failure the session is
    /// left `Lost` and the error is returned for this frame.
    fn reseed(&mut self, gray: &GrayImage, frame_index: u32) -> BarpathResult<()> {
        self.stats.reinitializations += 1;
        match self.detector.redetect(gray) {
            Ok(mut features) => {
                features.truncate(self.tracking.max_points);
                tracing::info!(
                    frame = frame_index,
                    features = features.len(),
                    "Features reinitialized"
                );
                self.features = Some(features);
                self.state = SessionState::Tracking;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(frame = frame_index, error = %e, "Reinitialization failed, tracking lost");
                self.features = None;
                self.state = SessionState::Lost;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barpath_vision_core::CalibrationMode;

    fn known_scale() -> CalibrationSettings {
        CalibrationSettings {
            mode: CalibrationMode::KnownDiameter { diameter_px: 300.0 },
            ..CalibrationSettings::default()
        }
    }

    /// Gray background with a bright square whose top-left corner is at `(x, y)`.
    fn square_frame(width: u32, height: u32, x: u32, y: u32, side: u32) -> RgbaFrame {
        let mut data = vec![0u8; (width * height * 4) as usize];
        for py in 0..height {
            for px in 0..width {
                let inside = px >= x && px < x + side && py >= y && py < y + side;
                let v = if inside { 220 } else { 40 };
                let i = ((py * width + px) * 4) as usize;
                data[i..i + 4].copy_from_slice(&[v, v, v, 255]);
            }
        }
        RgbaFrame::new(width, height, data).unwrap()
    }

    #[test]
    fn test_process_before_initialize_fails() {
        let mut session = TrackingSession::new(&EngineConfig::default());
        let frame = square_frame(160, 120, 60, 40, 40);
        assert!(matches!(
            session.process_frame(&frame, 0, 0.0),
            Err(BarpathError::NotInitialized)
        ));
    }

    #[test]
    fn test_initialize_and_track_translation() {
        let mut session = TrackingSession::new(&EngineConfig::default());
        let first = square_frame(320, 240, 140, 100, 40);
        let init = session
            .initialize(&first, &known_scale(), None, None)
            .unwrap();
        assert!(init.feature_count >= 1);
        assert_eq!(session.state(), SessionState::Tracking);

        let second = square_frame(320, 240, 143, 102, 40);
        let points = session.process_frame(&second, 1, 66.7).unwrap();
        assert!(!points.is_empty());
        for p in &points {
            assert_eq!(p.frame_index, 1);
            assert!(p.x >= 30.0 && p.x < 290.0);
        }
    }

    #[test]
    fn test_dimension_change_returns_empty_and_reinitializes() {
        let mut session = TrackingSession::new(&EngineConfig::default());
        session
            .initialize(&square_frame(320, 240, 140, 100, 40), &known_scale(), None, None)
            .unwrap();

        let resized = square_frame(400, 300, 180, 130, 40);
        let points = session.process_frame(&resized, 1, 66.0).unwrap();
        assert!(points.is_empty());
        assert_eq!(session.stats().dimension_changes, 1);
        assert_eq!(session.state(), SessionState::Tracking);

        let next = square_frame(400, 300, 181, 131, 40);
        assert!(session.process_frame(&next, 2, 132.0).is_ok());
    }

    /// Every tracked point lands inside the edge buffer, so nothing survives.
    fn all_points_filtered() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.tracking.edge_buffer_px = 1000.0;
        config
    }

    #[test]
    fn test_all_lost_reinitializes_immediately() {
        let mut session = TrackingSession::new(&all_points_filtered());
        let frame = square_frame(320, 240, 140, 100, 40);
        session.initialize(&frame, &known_scale(), None, None).unwrap();

        let points = session.process_frame(&frame, 1, 66.0).unwrap();
        assert!(points.is_empty());
        assert_eq!(session.stats().reinitializations, 1);
        assert!(session.feature_count() > 0);
        assert_eq!(session.state(), SessionState::Tracking);
    }

    #[test]
    fn test_failed_reinitialization_surfaces_error_then_recovers() {
        let mut session = TrackingSession::new(&all_points_filtered());
        let frame = square_frame(320, 240, 140, 100, 40);
        session.initialize(&frame, &known_scale(), None, None).unwrap();

        let blank = RgbaFrame::solid(320, 240, [40, 40, 40, 255]).unwrap();
        let err = session.process_frame(&blank, 1, 66.0).unwrap_err();
        assert!(matches!(err, BarpathError::NoFeaturesDetected { .. }));
        assert!(err.is_frame_recoverable());
        assert_eq!(session.state(), SessionState::Lost);
        assert_eq!(session.feature_count(), 0);
        assert_eq!(session.stats().reinitializations, 1);

        // A second blank frame is a new occurrence: one more attempt, one more error.
        assert!(matches!(
            session.process_frame(&blank, 2, 132.0),
            Err(BarpathError::NoFeaturesDetected { .. })
        ));
        assert_eq!(session.stats().reinitializations, 2);

        // Texture returns and the next frame re-seeds.
        assert!(session.process_frame(&frame, 3, 198.0).unwrap().is_empty());
        assert_eq!(session.state(), SessionState::Tracking);
        assert!(session.feature_count() > 0);
        assert_eq!(session.stats().lost_frames, 2);
        assert_eq!(session.stats().reinitializations, 3);
    }

    #[test]
    fn test_reset_then_process_is_not_initialized() {
        let mut session = TrackingSession::new(&EngineConfig::default());
        let frame = square_frame(320, 240, 140, 100, 40);
        session.initialize(&frame, &known_scale(), None, None).unwrap();
        session.reset();
        assert!(matches!(
            session.process_frame(&frame, 1, 66.0),
            Err(BarpathError::NotInitialized)
        ));
    }

    #[test]
    fn test_select_empty_region_keeps_features() {
        let mut session = TrackingSession::new(&EngineConfig::default());
        let frame = square_frame(320, 240, 140, 100, 40);
        let init = session.initialize(&frame, &known_scale(), None, None).unwrap();

        // Flat corner of the frame has no texture.
        let kept = session
            .select_region(Region::new(0.0, 0.0, 60.0, 60.0))
            .unwrap();
        assert_eq!(kept, init.feature_count);

        let reseeded = session
            .select_region(Region::new(120.0, 80.0, 80.0, 80.0))
            .unwrap();
        assert!(reseeded >= 1);
    }

    #[test]
    fn test_finalize_blocks_frames() {
        let mut session = TrackingSession::new(&EngineConfig::default());
        let frame = square_frame(320, 240, 140, 100, 40);
        session.initialize(&frame, &known_scale(), None, None).unwrap();
        let stats = session.finalize().unwrap();
        assert_eq!(stats.frames_processed, 0);
        assert_eq!(session.state(), SessionState::Finalized);
        assert!(session.process_frame(&frame, 1, 66.0).is_err());
    }

    #[test]
    fn test_blank_initial_frame_aborts() {
        let mut session = TrackingSession::new(&EngineConfig::default());
        let blank = RgbaFrame::solid(320, 240, [90, 90, 90, 255]).unwrap();
        let err = session
            .initialize(&blank, &known_scale(), None, None)
            .unwrap_err();
        assert!(err.is_fatal_at_start());
        assert_eq!(session.state(), SessionState::Uninitialized);
    }
}
