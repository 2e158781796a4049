//! Video decoding through the `ffmpeg` and `ffprobe` command-line tools.
//!
//! `ffmpeg` resamples to the target rate and scales to the analysis size,
//! then streams raw RGBA frames over stdout. Durations come from
//! `ffprobe`; containers that report none are probed for their last
//! packet time instead.

use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use barpath_common::clock::frame_timestamp_ms;
use barpath_common::config::SamplingConfig;
use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{RgbaFrame, SampledFrame};
use serde::Deserialize;

use crate::source::{FrameSource, VideoInfo};

/// Check whether a binary is on `PATH`.
pub fn command_exists(binary: &str) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("command -v {binary} >/dev/null 2>&1"))
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Container and stream facts reported by ffprobe.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub duration_secs: Option<f64>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    r_frame_rate: Option<String>,
    #[serde(default)]
    avg_frame_rate: Option<String>,
    #[serde(default)]
    duration: Option<String>,
}

/// Parse an ffprobe rate such as `30000/1001` or `25`.
pub fn parse_frame_rate(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}

fn parse_duration(raw: Option<&str>) -> Option<f64> {
    raw.and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0)
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
///
/// A missing, zero or non-numeric duration is reported as `None`.
pub fn parse_probe_output(json: &str) -> BarpathResult<ProbeReport> {
    let output: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| BarpathError::decode(format!("Unreadable ffprobe output: {e}")))?;
    let stream = output
        .streams
        .iter()
        .find(|s| s.width.unwrap_or(0) > 0 && s.height.unwrap_or(0) > 0)
        .ok_or_else(|| BarpathError::decode("No video stream found"))?;

    let duration_secs = parse_duration(
        output
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref()),
    )
    .or_else(|| parse_duration(stream.duration.as_deref()));
    let frame_rate = stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| stream.avg_frame_rate.as_deref().and_then(parse_frame_rate));

    Ok(ProbeReport {
        duration_secs,
        width: stream.width.unwrap_or(0),
        height: stream.height.unwrap_or(0),
        frame_rate,
    })
}

/// Largest `pts_time` in `ffprobe -show_entries packet=pts_time -of csv=p=0` output.
pub fn parse_last_packet_time(csv: &str) -> Option<f64> {
    csv.lines()
        .filter_map(|line| line.trim().trim_end_matches(',').parse::<f64>().ok())
        .filter(|t| t.is_finite())
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
        .filter(|t| *t > 0.0)
}

fn run_ffprobe(args: &[&str], path: &Path) -> BarpathResult<String> {
    let output = Command::new("ffprobe")
        .args(args)
        .arg(path)
        .output()
        .map_err(|e| BarpathError::decode(format!("Failed to start ffprobe: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BarpathError::decode(format!(
            "ffprobe failed for {}: {}",
            path.display(),
            stderr.trim()
        )));
    }
    String::from_utf8(output.stdout)
        .map_err(|e| BarpathError::decode(format!("ffprobe output is not UTF-8: {e}")))
}

/// Probe container duration, dimensions and frame rate.
pub fn probe_video(path: &Path) -> BarpathResult<ProbeReport> {
    if !path.exists() {
        return Err(BarpathError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let json = run_ffprobe(
        &[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ],
        path,
    )?;
    let mut report = parse_probe_output(&json)?;
    if report.duration_secs.is_none() {
        tracing::warn!(path = %path.display(), "Container reports no duration, probing packets");
        report.duration_secs = probe_last_packet_time(path);
    }
    Ok(report)
}

/// Find the true end of a stream whose container omits its duration.
fn probe_last_packet_time(path: &Path) -> Option<f64> {
    let csv = run_ffprobe(
        &[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "packet=pts_time",
            "-of",
            "csv=p=0",
        ],
        path,
    )
    .map_err(|e| tracing::warn!(error = %e, "Packet probe failed"))
    .ok()?;
    parse_last_packet_time(&csv)
}

/// Build the [`VideoInfo`] for a probe under a sampling policy.
pub fn video_info(report: &ProbeReport, sampling: &SamplingConfig) -> VideoInfo {
    let (sampled_width, sampled_height) = sampling.fit_dimensions(report.width, report.height);
    let (duration_secs, expected_frames) = match report.duration_secs {
        Some(d) => (d, ((d * sampling.target_fps).ceil() as u32).max(1)),
        None => {
            let frames = sampling.fallback_frame_count.max(1);
            tracing::warn!(frames, "Duration unknown, assuming fallback frame count");
            (0.0, frames)
        }
    };
    VideoInfo {
        duration_secs,
        width: report.width,
        height: report.height,
        native_fps: report.frame_rate,
        sampled_width,
        sampled_height,
        expected_frames,
    }
}

/// Frames decoded from a video file by an `ffmpeg` child process.
pub struct FfmpegFrameSource {
    path: PathBuf,
    info: VideoInfo,
    target_fps: f64,
    child: Child,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    next_index: u32,
    finished: bool,
}

impl FfmpegFrameSource {
    /// Probe `path` and start decoding it at the configured rate and size.
    pub fn open(path: &Path, sampling: &SamplingConfig) -> BarpathResult<Self> {
        sampling.validate()?;
        let report = probe_video(path)?;
        let info = video_info(&report, sampling);

        let filter = format!(
            "fps={},scale={}:{}",
            sampling.target_fps, info.sampled_width, info.sampled_height
        );
        tracing::debug!(path = %path.display(), %filter, "Starting ffmpeg decoder");

        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-vf", &filter, "-f", "rawvideo", "-pix_fmt", "rgba", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BarpathError::decode(format!("Failed to start ffmpeg: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BarpathError::decode("Failed to capture ffmpeg stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BarpathError::decode("Failed to capture ffmpeg stderr"))?;

        // ffmpeg stalls once its stderr pipe fills up.
        let stderr_task = std::thread::spawn(move || -> String {
            let mut reader = BufReader::new(stderr);
            let mut output = String::new();
            match reader.read_to_string(&mut output) {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        tracing::info!(
            pid = child.id(),
            duration_secs = info.duration_secs,
            width = info.sampled_width,
            height = info.sampled_height,
            expected_frames = info.expected_frames,
            "Decoding video"
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            target_fps: sampling.target_fps,
            child,
            stdout: BufReader::new(stdout),
            stderr_task: Some(stderr_task),
            next_index: 0,
            finished: false,
        })
    }

    fn frame_bytes(&self) -> usize {
        self.info.sampled_width as usize * self.info.sampled_height as usize * 4
    }

    /// Reap the child after end of stream and turn a failed exit into an error.
    fn finish(&mut self) -> BarpathResult<()> {
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| BarpathError::decode(format!("Failed waiting for ffmpeg: {e}")))?;
        let stderr = self
            .stderr_task
            .take()
            .and_then(|task| task.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(BarpathError::decode(format!(
                "ffmpeg failed decoding {} ({status}): {}",
                self.path.display(),
                stderr.trim()
            )));
        }
        tracing::debug!(frames = self.next_index, "ffmpeg decoder finished");
        Ok(())
    }
}

impl FrameSource for FfmpegFrameSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> BarpathResult<Option<SampledFrame>> {
        if self.finished {
            return Ok(None);
        }
        let mut buffer = vec![0u8; self.frame_bytes()];
        let mut filled = 0;
        while filled < buffer.len() {
            let read = self.stdout.read(&mut buffer[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }
        if filled < buffer.len() {
            tracing::warn!(filled, expected = buffer.len(), "Dropping truncated final frame");
            self.finish()?;
            return Ok(None);
        }

        let index = self.next_index;
        self.next_index += 1;
        let frame = RgbaFrame::new(self.info.sampled_width, self.info.sampled_height, buffer)?;
        Ok(Some(SampledFrame {
            index,
            timestamp_ms: frame_timestamp_ms(index, self.target_fps),
            frame,
        }))
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("abc"), None);
    }

    #[test]
    fn test_last_packet_time() {
        let csv = "0.000000\n0.033367\nN/A\n2.135467,\n2.102100\n";
        assert_eq!(parse_last_packet_time(csv), Some(2.135467));
        assert_eq!(parse_last_packet_time(""), None);
    }

    #[test]
    fn test_video_info_uses_fallback_frames() {
        let report = ProbeReport {
            duration_secs: None,
            width: 1920,
            height: 1080,
            frame_rate: Some(30.0),
        };
        let info = video_info(&report, &SamplingConfig::default());
        assert_eq!(info.expected_frames, 30);
        assert_eq!(info.duration_secs, 0.0);
        assert_eq!((info.sampled_width, info.sampled_height), (720, 404));
    }

    #[test]
    fn test_video_info_expected_frames() {
        let report = ProbeReport {
            duration_secs: Some(2.0),
            width: 640,
            height: 480,
            frame_rate: None,
        };
        let info = video_info(&report, &SamplingConfig::default());
        assert_eq!(info.expected_frames, 30);
        assert_eq!((info.sampled_width, info.sampled_height), (640, 480));
    }

    #[test]
    fn test_probe_missing_file() {
        let err = probe_video(Path::new("/nonexistent/lift.mp4")).unwrap_err();
        assert!(matches!(err, BarpathError::FileNotFound { .. }));
    }
}
