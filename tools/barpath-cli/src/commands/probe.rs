//! Probe a video file.

use std::path::PathBuf;

use barpath_common::config::SamplingConfig;
use barpath_tracking_engine::video::video_info;
use barpath_tracking_engine::probe_video;

pub fn run(path: PathBuf, sampling: &SamplingConfig) -> anyhow::Result<()> {
    let report =
        probe_video(&path).map_err(|e| anyhow::anyhow!("Failed to probe {}: {e}", path.display()))?;
    let info = video_info(&report, sampling);

    println!("Video: {}", path.display());
    match report.duration_secs {
        Some(d) => println!("  Duration: {d:.3}s"),
        None => println!("  Duration: unknown"),
    }
    println!("  Dimensions: {}x{}", report.width, report.height);
    match report.frame_rate {
        Some(fps) => println!("  Frame rate: {fps:.3} fps"),
        None => println!("  Frame rate: unknown"),
    }
    println!(
        "  Analysis: {} frames at {} fps, {}x{}",
        info.expected_frames, sampling.target_fps, info.sampled_width, info.sampled_height
    );
    Ok(())
}
