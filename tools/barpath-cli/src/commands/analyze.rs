//! Analyze a lift video.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use barpath_common::config::AppConfig;
use barpath_hint_ai::{HintProvider, HttpHintProvider};
use barpath_motion_model::{LiftDirection, Point2, Region};
use barpath_tracking_engine::{
    AnalysisOptions, AnalysisOutput, AnalysisPipeline, AnalysisProgress, EngineConfig,
    ProgressCallback,
};
use barpath_vision_core::CalibrationMode;
use clap::{Args, ValueEnum};

#[derive(Args)]
pub struct AnalyzeArgs {
    /// Path to the video file
    pub path: PathBuf,

    /// Real plate diameter in millimeters
    #[arg(long)]
    pub plate_mm: Option<f64>,

    /// Plate diameter already measured in pixels (skips plate detection)
    #[arg(long, conflicts_with = "manual")]
    pub known_diameter: Option<f64>,

    /// Manual calibration line: x1,y1,x2,y2,length_mm
    #[arg(long, value_parser = parse_manual)]
    pub manual: Option<CalibrationMode>,

    /// Region around the bar on the first frame: x,y,width,height
    #[arg(long, value_parser = parse_region)]
    pub region: Option<Region>,

    /// Analysis sample rate
    #[arg(long)]
    pub fps: Option<f64>,

    /// Lifting direction
    #[arg(long, value_enum)]
    pub direction: Option<DirectionArg>,

    /// Hint service base URL (enables hints for this run)
    #[arg(long)]
    pub hints_endpoint: Option<String>,

    /// Write the full analysis as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the result as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DirectionArg {
    Up,
    Down,
    Auto,
}

impl From<DirectionArg> for LiftDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Up => LiftDirection::Up,
            DirectionArg::Down => LiftDirection::Down,
            DirectionArg::Auto => LiftDirection::Auto,
        }
    }
}

fn parse_numbers(raw: &str, expected: usize) -> Result<Vec<f64>, String> {
    let values = raw
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("invalid number in '{raw}': {e}"))?;
    if values.len() != expected {
        return Err(format!(
            "expected {expected} comma-separated values, got {}",
            values.len()
        ));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(format!("values must be finite: '{raw}'"));
    }
    Ok(values)
}

fn parse_manual(raw: &str) -> Result<CalibrationMode, String> {
    let v = parse_numbers(raw, 5)?;
    if v[4] <= 0.0 {
        return Err("length_mm must be positive".to_string());
    }
    Ok(CalibrationMode::Manual {
        start: Point2::new(v[0], v[1]),
        end: Point2::new(v[2], v[3]),
        length_mm: v[4],
    })
}

fn parse_region(raw: &str) -> Result<Region, String> {
    let v = parse_numbers(raw, 4)?;
    let region = Region::new(v[0], v[1], v[2], v[3]);
    if region.is_empty() {
        return Err("region must have positive width and height".to_string());
    }
    Ok(region)
}

fn hint_provider(
    args: &AnalyzeArgs,
    app: &AppConfig,
) -> anyhow::Result<Option<Arc<dyn HintProvider>>> {
    let mut hints = app.hints.clone();
    if let Some(endpoint) = &args.hints_endpoint {
        hints.enabled = true;
        hints.endpoint = Some(endpoint.clone());
    }
    if !hints.enabled {
        return Ok(None);
    }
    let provider = HttpHintProvider::new(&hints)
        .map_err(|e| anyhow::anyhow!("Invalid hint service settings: {e}"))?;
    Ok(Some(Arc::new(provider)))
}

pub async fn run(args: AnalyzeArgs, app: AppConfig) -> anyhow::Result<()> {
    let mut config = EngineConfig::from_app(&app)
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;
    if let Some(fps) = args.fps {
        config.sampling.target_fps = fps;
    }
    if let Some(direction) = args.direction {
        config.velocity.lift_direction = direction.into();
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {e}"))?;

    let mut calibration = config.calibration.clone();
    if let Some(mm) = args.plate_mm {
        calibration.plate_diameter_mm = mm;
    }
    if let Some(diameter_px) = args.known_diameter {
        calibration.mode = CalibrationMode::KnownDiameter { diameter_px };
    }
    if let Some(manual) = args.manual.clone() {
        calibration.mode = manual;
    }
    let options = AnalysisOptions {
        calibration: Some(calibration),
        region: args.region,
    };

    let mut pipeline = AnalysisPipeline::new(config);
    if let Some(provider) = hint_provider(&args, &app)? {
        if provider.is_available().await {
            tracing::info!(provider = provider.name(), "Hint service available");
            pipeline = pipeline.with_hints(provider);
        } else {
            tracing::warn!("Hint service is not available, continuing without hints");
        }
    }

    let cancel = pipeline.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let quiet = args.json;
    let progress_cb: ProgressCallback = Box::new(move |p: AnalysisProgress| {
        if !quiet {
            eprint!(
                "\r  {:<24} {:>5.1}% ({}/{} frames)  ",
                p.stage.label(),
                p.progress * 100.0,
                p.frames_processed,
                p.total_frames,
            );
        }
    });

    if !args.json {
        println!("Analyzing: {}", args.path.display());
    }
    let output = pipeline
        .analyze_video(&args.path, &options, Some(progress_cb))
        .await;
    if !args.json {
        eprintln!();
    }
    let output = output.map_err(|e| anyhow::anyhow!("Analysis failed: {e}"))?;

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&output)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        if !args.json {
            println!("Wrote analysis to {}", path.display());
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&output.result)?);
    } else {
        print_summary(&output);
    }
    Ok(())
}

fn print_summary(output: &AnalysisOutput) {
    let r = &output.result;
    println!();
    println!("Mean velocity:    {:.3} m/s", r.velocity.mean);
    println!("Peak velocity:    {:.3} m/s", r.velocity.peak);
    println!("Power zone:       {}", r.power_zone);
    println!(
        "Concentric phase: frames {}-{} ({:.2}s, {:?}{})",
        r.concentric_phase.start_frame,
        r.concentric_phase.end_frame,
        r.concentric_duration_s,
        r.lift_direction,
        if r.concentric_phase.detected {
            ""
        } else {
            ", not detected"
        }
    );
    println!("Rep duration:     {:.2}s", r.rep_duration_s);
    println!("Range of motion:  {:.0} mm", r.range_of_motion_mm);
    println!("Path deviation:   {:.1} mm", r.path_deviation_mm);
    println!(
        "Calibration:      {:.4} px/mm ({}, confidence {:.2})",
        r.calibration.pixels_per_mm(),
        r.calibration.method().as_str(),
        r.calibration.confidence()
    );
    println!(
        "Samples:          {} at {} fps ({} path points, {} missing frames)",
        r.sample_count(),
        r.sample_rate_hz,
        r.path.len(),
        r.path.missing_frames()
    );
    println!(
        "Tracking:         {} frames, {} reinitializations",
        output.stats.frames_processed, output.stats.reinitializations
    );
}
