//! Analysis pipeline: decode, track, reconstruct, analyze.
//!
//! Frames are pulled from a [`FrameSource`] on a blocking thread and fed to
//! the tracking worker in order. The first sampled frame is the reference:
//! hints are requested for it, the session is initialized on it, and its
//! features become the first tracked points. Every later frame goes through
//! `process_frame`. Once the source is exhausted the collected points are
//! reconstructed into a path and analyzed at the sampling rate.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use barpath_analysis_core::{PathReconstructor, VelocityAnalyzer};
use barpath_common::error::{BarpathError, BarpathResult};
use barpath_hint_ai::HintProvider;
use barpath_motion_model::{
    AnalysisResult, CalibrationHint, CalibrationResult, Region, RegionHint, RgbaFrame,
    SampledFrame, TrackedPoint,
};
use barpath_vision_core::{CalibrationMode, CalibrationSettings};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::config::EngineConfig;
use crate::session::SessionStats;
use crate::source::{FrameSource, VideoInfo};
use crate::video::FfmpegFrameSource;
use crate::worker::EngineHandle;

/// Decoded frames buffered ahead of the tracker.
const FRAME_QUEUE_DEPTH: usize = 4;

/// Progress callback for analysis runs.
pub type ProgressCallback = Box<dyn Fn(AnalysisProgress) + Send>;

/// Analysis progress report.
#[derive(Debug, Clone)]
pub struct AnalysisProgress {
    /// Current progress [0.0, 1.0]. Never decreases within a run.
    pub progress: f64,

    /// Sampled frames handled so far.
    pub frames_processed: u32,

    /// Sampled frames expected. An estimate when the duration is unknown.
    pub total_frames: u32,

    pub stage: AnalysisStage,
}

/// Stages of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStage {
    Probing,
    Calibrating,
    Initializing,
    Tracking,
    Reconstructing,
    Analyzing,
    Complete,
    Failed,
}

impl AnalysisStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Probing => "Probing video",
            Self::Calibrating => "Calibrating",
            Self::Initializing => "Initializing tracking",
            Self::Tracking => "Tracking frames",
            Self::Reconstructing => "Reconstructing bar path",
            Self::Analyzing => "Analyzing velocity",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }
}

/// Per-run inputs that are not engine tuning.
#[derive(Debug, Clone, Default)]
pub struct AnalysisOptions {
    /// Overrides the engine's calibration settings when set.
    pub calibration: Option<CalibrationSettings>,

    /// Region selected by the user on the reference frame. Takes precedence
    /// over any region hint from the provider.
    pub region: Option<Region>,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub result: AnalysisResult,
    pub stats: SessionStats,
    pub video: VideoInfo,
    /// Raw per-frame points before reconstruction.
    pub tracked_points: usize,
}

/// Cloneable flag that stops a run before its next frame.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reports progress, holding the fraction monotonic.
struct ProgressReporter {
    callback: Option<ProgressCallback>,
    last: f64,
    total_frames: u32,
    frames_processed: u32,
}

impl ProgressReporter {
    fn new(callback: Option<ProgressCallback>) -> Self {
        Self {
            callback,
            last: 0.0,
            total_frames: 0,
            frames_processed: 0,
        }
    }

    fn report(&mut self, stage: AnalysisStage, fraction: f64) {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            self.last
        };
        self.last = self.last.max(fraction);
        tracing::debug!(stage = stage.label(), progress = self.last, "Analysis progress");
        if let Some(cb) = &self.callback {
            cb(AnalysisProgress {
                progress: self.last,
                frames_processed: self.frames_processed,
                total_frames: self.total_frames,
                stage,
            });
        }
    }

    /// Tracking occupies 10% to 85% of the bar.
    fn frame_done(&mut self) {
        self.frames_processed += 1;
        // Sources without a duration may overrun the estimate.
        let total = self.total_frames.max(self.frames_processed).max(1);
        let fraction = 0.10 + 0.75 * self.frames_processed as f64 / total as f64;
        self.report(AnalysisStage::Tracking, fraction);
    }
}

/// Drives one analysis at a time over a frame source.
pub struct AnalysisPipeline {
    config: EngineConfig,
    hints: Option<Arc<dyn HintProvider>>,
    cancel: CancelToken,
}

impl AnalysisPipeline {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            hints: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_hints(mut self, provider: Arc<dyn HintProvider>) -> Self {
        self.hints = Some(provider);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Token that cancels runs of this pipeline.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Probe and decode a video file, then analyze it.
    pub async fn analyze_video(
        &self,
        path: &Path,
        options: &AnalysisOptions,
        progress: Option<ProgressCallback>,
    ) -> BarpathResult<AnalysisOutput> {
        let mut reporter = ProgressReporter::new(progress);
        reporter.report(AnalysisStage::Probing, 0.0);

        let owned = path.to_path_buf();
        let sampling = self.config.sampling.clone();
        let opened = tokio::task::spawn_blocking(move || FfmpegFrameSource::open(&owned, &sampling))
            .await
            .map_err(|e| BarpathError::engine(format!("decoder task failed: {e}")));
        let source = match opened.and_then(|r| r) {
            Ok(source) => source,
            Err(e) => {
                reporter.report(AnalysisStage::Failed, reporter.last);
                return Err(e);
            }
        };
        self.run_with_reporter(source, options, reporter).await
    }

    /// Analyze frames from `source`.
    pub async fn run<S>(
        &self,
        source: S,
        options: &AnalysisOptions,
        progress: Option<ProgressCallback>,
    ) -> BarpathResult<AnalysisOutput>
    where
        S: FrameSource + 'static,
    {
        let mut reporter = ProgressReporter::new(progress);
        reporter.report(AnalysisStage::Probing, 0.0);
        self.run_with_reporter(source, options, reporter).await
    }

    async fn run_with_reporter<S>(
        &self,
        source: S,
        options: &AnalysisOptions,
        mut reporter: ProgressReporter,
    ) -> BarpathResult<AnalysisOutput>
    where
        S: FrameSource + 'static,
    {
        let video = source.info().clone();
        reporter.total_frames = video.expected_frames;

        let (engine, worker) = EngineHandle::spawn(&self.config);
        let result = self.drive(source, options, &engine, &mut reporter).await;
        drop(engine);
        if let Err(e) = worker.await {
            tracing::warn!(error = %e, "Tracking worker did not shut down cleanly");
        }

        match result {
            Ok(Tracked {
                points,
                stats,
                calibration,
            }) => match self.finish(&points, &calibration, &mut reporter) {
                Ok(result) => {
                    reporter.report(AnalysisStage::Complete, 1.0);
                    Ok(AnalysisOutput {
                        result,
                        stats,
                        video,
                        tracked_points: points.len(),
                    })
                }
                Err(e) => {
                    reporter.report(AnalysisStage::Failed, reporter.last);
                    Err(e)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "Analysis aborted");
                reporter.report(AnalysisStage::Failed, reporter.last);
                Err(e)
            }
        }
    }

    /// Feed every frame through the worker and collect tracked points.
    async fn drive<S>(
        &self,
        source: S,
        options: &AnalysisOptions,
        engine: &EngineHandle,
        reporter: &mut ProgressReporter,
    ) -> BarpathResult<Tracked>
    where
        S: FrameSource + 'static,
    {
        let (tx, mut rx) = mpsc::channel(FRAME_QUEUE_DEPTH);
        let reader = tokio::task::spawn_blocking(move || read_frames(source, tx));

        let mut points = Vec::new();
        let mut calibration = None;
        let outcome = loop {
            if self.cancel.is_cancelled() {
                tracing::info!(frames = reporter.frames_processed, "Analysis cancelled");
                break Err(BarpathError::Cancelled);
            }
            let sampled = match rx.recv().await {
                Some(Ok(sampled)) => sampled,
                Some(Err(e)) => break Err(e),
                None => break Ok(()),
            };

            if calibration.is_none() {
                match self.start(engine, &sampled, options, reporter, &mut points).await {
                    Ok(resolved) => calibration = Some(resolved),
                    Err(e) => break Err(e),
                }
                reporter.frame_done();
                continue;
            }

            match engine
                .process_frame(sampled.frame, sampled.index, sampled.timestamp_ms)
                .await
            {
                Ok(frame_points) => {
                    tracing::trace!(frame = sampled.index, points = frame_points.len(), "Frame tracked");
                    points.extend(frame_points);
                }
                Err(e) if e.is_frame_recoverable() => {
                    tracing::warn!(frame = sampled.index, error = %e, "Skipping frame");
                }
                Err(e) => break Err(e),
            }
            reporter.frame_done();
        };

        // Closing the receiver stops the reader at its next send.
        drop(rx);
        if let Err(e) = reader.await {
            tracing::warn!(error = %e, "Frame reader did not shut down cleanly");
        }
        outcome?;

        let calibration =
            calibration.ok_or_else(|| BarpathError::decode("video contains no frames"))?;
        let stats = engine.finalize().await?;
        tracing::info!(
            frames = stats.frames_processed,
            points = points.len(),
            reinitializations = stats.reinitializations,
            lost_frames = stats.lost_frames,
            "Tracking finished"
        );
        Ok(Tracked {
            points,
            stats,
            calibration,
        })
    }

    /// Hints, calibration and feature seeding on the reference frame.
    async fn start(
        &self,
        engine: &EngineHandle,
        sampled: &SampledFrame,
        options: &AnalysisOptions,
        reporter: &mut ProgressReporter,
        points: &mut Vec<TrackedPoint>,
    ) -> BarpathResult<CalibrationResult> {
        reporter.report(AnalysisStage::Calibrating, 0.05);
        let settings = options
            .calibration
            .clone()
            .unwrap_or_else(|| self.config.calibration.clone());

        let calibration_hint = if settings.use_hint && matches!(settings.mode, CalibrationMode::Plate) {
            self.calibration_hint(&sampled.frame).await
        } else {
            None
        };
        let region_hint = match options.region {
            Some(region) => Some(RegionHint::new(
                region.clamp_to(sampled.frame.width(), sampled.frame.height()),
                1.0,
            )),
            None => self.region_hint(&sampled.frame).await,
        };

        reporter.report(AnalysisStage::Initializing, 0.08);
        let init = engine
            .initialize(sampled.frame.clone(), settings, calibration_hint, region_hint)
            .await?;
        points.extend(
            init.features
                .iter()
                .map(|p| TrackedPoint::new(*p, sampled.index, sampled.timestamp_ms)),
        );
        reporter.report(AnalysisStage::Tracking, 0.10);
        Ok(init.calibration)
    }

    async fn region_hint(&self, frame: &RgbaFrame) -> Option<RegionHint> {
        let provider = self.hints.as_ref()?;
        match provider.detect_region(frame).await {
            Ok(hint) => hint,
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "Region hint unavailable");
                None
            }
        }
    }

    async fn calibration_hint(&self, frame: &RgbaFrame) -> Option<CalibrationHint> {
        let provider = self.hints.as_ref()?;
        match provider.detect_calibration(frame).await {
            Ok(hint) => hint,
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "Calibration hint unavailable");
                None
            }
        }
    }

    fn finish(
        &self,
        points: &[TrackedPoint],
        calibration: &CalibrationResult,
        reporter: &mut ProgressReporter,
    ) -> BarpathResult<AnalysisResult> {
        reporter.report(AnalysisStage::Reconstructing, 0.90);
        let path = PathReconstructor::new(self.config.path.clone()).reconstruct(points);
        if path.len() < 2 {
            return Err(BarpathError::analysis(format!(
                "bar path has {} point(s), at least 2 are needed",
                path.len()
            )));
        }

        reporter.report(AnalysisStage::Analyzing, 0.95);
        VelocityAnalyzer::new(self.config.velocity.clone()).analyze(
            &path,
            calibration,
            self.config.sampling.target_fps,
        )
    }
}

/// Output of the tracking phase.
struct Tracked {
    points: Vec<TrackedPoint>,
    stats: SessionStats,
    calibration: CalibrationResult,
}

/// Pull frames until the source ends, fails, or the receiver goes away.
fn read_frames<S: FrameSource>(mut source: S, tx: mpsc::Sender<BarpathResult<SampledFrame>>) {
    loop {
        let next = match source.next_frame() {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => return,
            Err(e) => Err(e),
        };
        let failed = next.is_err();
        if tx.blocking_send(next).is_err() || failed {
            return;
        }
    }
}
