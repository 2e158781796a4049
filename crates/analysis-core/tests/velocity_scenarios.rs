use std::path::PathBuf;

use barpath_analysis_core::{PathReconstructor, VelocityAnalyzer};
use barpath_motion_model::{
    BarbellPathPoint, CalibrationMethod, CalibrationResult, Point2, ReconstructedPath,
    TrackedPoint, VerticalDirection,
};
use serde::Deserialize;

#[derive(Deserialize)]
struct LiftFixture {
    plate_diameter_px: f64,
    plate_diameter_mm: f64,
    sample_rate_hz: f64,
    points: Vec<TrackedPoint>,
}

fn load_fixture(name: &str) -> LiftFixture {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("lifts")
        .join(name);

    let content = std::fs::read_to_string(path).expect("fixture should be readable");
    serde_json::from_str(&content).expect("fixture should parse")
}

#[test]
fn linear_descent_fixture_measures_045_mps() {
    let fixture = load_fixture("linear-descent.json");
    let calibration = CalibrationResult::from_reference(
        fixture.plate_diameter_px,
        fixture.plate_diameter_mm,
        CalibrationMethod::KnownScale,
        1.0,
    )
    .unwrap();

    let path = PathReconstructor::with_defaults().reconstruct(&fixture.points);
    assert_eq!(path.len(), 30);
    assert!(path.gaps.is_empty());

    let result = VelocityAnalyzer::with_defaults()
        .analyze(&path, &calibration, fixture.sample_rate_hz)
        .unwrap();

    let mean = result.velocity.mean;
    assert!((mean - 0.45).abs() <= 0.45 * 0.02, "mean = {mean}");
    assert!(result.concentric_phase.detected);
    assert_eq!(result.concentric_phase.start_frame, 0);
    assert_eq!(result.concentric_phase.end_frame, 29);
    assert_eq!(result.lift_direction, VerticalDirection::Down);
    assert!((result.range_of_motion_mm - 450.0).abs() < 0.5);
    assert!(result.path_deviation_mm < 0.5);
    assert!((result.concentric_duration_s - 1.0).abs() < 1e-3);
    assert_eq!(result.sample_count(), 29);
}

#[test]
fn two_frame_translation_matches_offset_over_time() {
    let calibration =
        CalibrationResult::new(300.0 / 450.0, CalibrationMethod::KnownScale, 1.0).unwrap();
    let dt_ms = 1000.0 / 15.0;
    let points = vec![
        TrackedPoint::new(Point2::new(200.0, 300.0), 0, 0.0),
        TrackedPoint::new(Point2::new(206.0, 292.0), 1, dt_ms),
    ];

    let path = PathReconstructor::with_defaults().reconstruct(&points);
    let result = VelocityAnalyzer::with_defaults()
        .analyze(&path, &calibration, 15.0)
        .unwrap();

    let offset_px = 10.0;
    let expected = offset_px / calibration.pixels_per_mm() / 1000.0 / (dt_ms / 1000.0);
    assert_eq!(result.velocity.instantaneous.len(), 1);
    assert!((result.velocity.instantaneous[0] - expected).abs() < 1e-9);
    assert!((result.velocity.peak - expected).abs() < 1e-9);
}

#[test]
fn analysis_result_serializes_with_zone_and_phase() {
    let mut path = ReconstructedPath::default();
    for i in 0..4u32 {
        path.push(BarbellPathPoint {
            frame_index: i,
            timestamp_ms: i as f64 * 100.0,
            x: 50.0,
            y: 400.0 - i as f64 * 120.0,
            support: 4,
        });
    }
    let calibration = CalibrationResult::new(1.0, CalibrationMethod::Manual, 1.0).unwrap();
    let result = VelocityAnalyzer::with_defaults()
        .analyze(&path, &calibration, 10.0)
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["power_zone"], "speed_strength");
    assert_eq!(json["lift_direction"], "up");
    assert_eq!(json["concentric_phase"]["detected"], true);
    assert_eq!(json["calibration"]["method"], "manual");
}

#[test]
fn rep_duration_spans_pauses_around_concentric_phase() {
    let calibration = CalibrationResult::new(1.0, CalibrationMethod::Manual, 1.0).unwrap();
    let dt_ms = 1000.0 / 15.0;
    // Hold, rise 30 px per frame from frame 2 to 10, then hold to frame 14.
    let points: Vec<TrackedPoint> = (0..15u32)
        .map(|i| {
            let climbed = (i.clamp(2, 10) - 2) as f64 * 30.0;
            TrackedPoint::new(Point2::new(320.0, 500.0 - climbed), i, i as f64 * dt_ms)
        })
        .collect();

    let path = PathReconstructor::with_defaults().reconstruct(&points);
    let result = VelocityAnalyzer::with_defaults()
        .analyze(&path, &calibration, 15.0)
        .unwrap();

    assert!(result.concentric_phase.detected);
    assert_eq!(result.concentric_phase.start_frame, 2);
    assert_eq!(result.concentric_phase.end_frame, 10);
    assert!((result.concentric_duration_s - 8.0 / 15.0).abs() < 1e-9);
    assert!((result.rep_duration_s - 14.0 / 15.0).abs() < 1e-9);
    assert!(result.rep_duration_s > result.concentric_duration_s);
}
