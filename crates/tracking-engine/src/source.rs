//! Frame sources: where sampled RGBA frames come from.

use barpath_common::clock::{ms_to_secs, RateController};
use barpath_common::config::SamplingConfig;
use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{RgbaFrame, SampledFrame};
use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// What is known about a source before decoding starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds. Zero when it could not be determined.
    pub duration_secs: f64,
    /// Native dimensions.
    pub width: u32,
    pub height: u32,
    /// Native frame rate, if reported.
    pub native_fps: Option<f64>,
    /// Dimensions of the frames handed to tracking.
    pub sampled_width: u32,
    pub sampled_height: u32,
    /// Number of sampled frames expected. Used for progress only.
    pub expected_frames: u32,
}

/// A stream of frames at the analysis sample rate.
pub trait FrameSource: Send {
    fn info(&self) -> &VideoInfo;

    /// Next sampled frame, or `None` at end of stream.
    fn next_frame(&mut self) -> BarpathResult<Option<SampledFrame>>;
}

/// Frames already in memory, each with its native timestamp.
///
/// Applies the same sampling policy as the video decoder: frames are
/// downsampled to the target rate and fitted inside the configured box.
pub struct MemoryFrameSource {
    frames: std::vec::IntoIter<(f64, RgbaFrame)>,
    rate: RateController,
    info: VideoInfo,
    next_index: u32,
}

impl MemoryFrameSource {
    pub fn new(frames: Vec<(f64, RgbaFrame)>, sampling: &SamplingConfig) -> BarpathResult<Self> {
        sampling.validate()?;
        let (width, height) = frames
            .first()
            .map(|(_, f)| (f.width(), f.height()))
            .ok_or_else(|| BarpathError::decode("no frames supplied"))?;
        let (sampled_width, sampled_height) = sampling.fit_dimensions(width, height);

        let first_ms = frames.first().map(|(t, _)| *t).unwrap_or(0.0);
        let last_ms = frames.last().map(|(t, _)| *t).unwrap_or(first_ms);
        let duration_secs = ms_to_secs(last_ms - first_ms).max(0.0);
        let expected_frames = (duration_secs * sampling.target_fps).floor() as u32 + 1;

        Ok(Self {
            frames: frames.into_iter(),
            rate: RateController::new(sampling.target_fps),
            info: VideoInfo {
                duration_secs,
                width,
                height,
                native_fps: None,
                sampled_width,
                sampled_height,
                expected_frames,
            },
            next_index: 0,
        })
    }
}

impl FrameSource for MemoryFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> BarpathResult<Option<SampledFrame>> {
        for (timestamp_ms, frame) in self.frames.by_ref() {
            if !self.rate.should_tick(timestamp_ms) {
                continue;
            }
            let frame = fit_frame(frame, self.info.sampled_width, self.info.sampled_height)?;
            let index = self.next_index;
            self.next_index += 1;
            return Ok(Some(SampledFrame {
                index,
                timestamp_ms,
                frame,
            }));
        }
        Ok(None)
    }
}

/// Resize `frame` to exactly `width`x`height` unless it already matches.
pub fn fit_frame(frame: RgbaFrame, width: u32, height: u32) -> BarpathResult<RgbaFrame> {
    if frame.width() == width && frame.height() == height {
        return Ok(frame);
    }
    let (w, h) = (frame.width(), frame.height());
    let image = RgbaImage::from_raw(w, h, frame.into_bytes())
        .ok_or_else(|| BarpathError::invalid_frame(format!("buffer does not match {w}x{h}")))?;
    let resized = imageops::resize(&image, width, height, FilterType::Triangle);
    RgbaFrame::new(width, height, resized.into_raw())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(count: u32, fps: f64, width: u32, height: u32) -> Vec<(f64, RgbaFrame)> {
        (0..count)
            .map(|i| {
                (
                    i as f64 * 1000.0 / fps,
                    RgbaFrame::solid(width, height, [10, 20, 30, 255]).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_downsamples_30_to_15() {
        let mut source = MemoryFrameSource::new(frames(30, 30.0, 64, 48), &SamplingConfig::default()).unwrap();
        let mut emitted = Vec::new();
        while let Some(frame) = source.next_frame().unwrap() {
            emitted.push(frame);
        }
        assert_eq!(emitted.len(), 15);
        assert_eq!(emitted[0].index, 0);
        assert_eq!(emitted[14].index, 14);
        assert!((emitted[1].timestamp_ms - 1000.0 / 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_frames_fitted_to_box() {
        let mut source = MemoryFrameSource::new(frames(2, 15.0, 1440, 1080), &SamplingConfig::default()).unwrap();
        assert_eq!(source.info().sampled_width, 720);
        assert_eq!(source.info().sampled_height, 540);
        let frame = source.next_frame().unwrap().unwrap();
        assert_eq!(frame.frame.width(), 720);
        assert_eq!(frame.frame.height(), 540);
    }

    #[test]
    fn test_empty_source_rejected() {
        let result = MemoryFrameSource::new(Vec::new(), &SamplingConfig::default());
        assert!(matches!(result, Err(BarpathError::Decode { .. })));
    }
}
