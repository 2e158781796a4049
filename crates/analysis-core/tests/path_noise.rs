use barpath_analysis_core::PathReconstructor;
use barpath_motion_model::{Point2, TrackedPoint};

const WIDTH: f64 = 640.0;
const HEIGHT: f64 = 480.0;
const EDGE_BUFFER: f64 = 30.0;

/// Small deterministic generator so the scenario is reproducible.
struct XorShift(u64);

impl XorShift {
    fn next_unit(&mut self) -> f64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }

    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_unit()
    }
}

fn true_position(frame: u32) -> Point2 {
    Point2::new(320.0, 100.0 + 300.0 * frame as f64 / 29.0)
}

#[test]
fn half_noise_cloud_stays_near_true_path() {
    let mut rng = XorShift(0x9e37_79b9_7f4a_7c15);
    let mut points = Vec::new();

    for frame in 0..30u32 {
        let truth = true_position(frame);
        let ts = frame as f64 * 1000.0 / 15.0;
        for _ in 0..4 {
            let jittered = Point2::new(
                truth.x + rng.range(-3.0, 3.0),
                truth.y + rng.range(-3.0, 3.0),
            );
            points.push(TrackedPoint::new(jittered, frame, ts));

            let noise = Point2::new(
                rng.range(EDGE_BUFFER, WIDTH - EDGE_BUFFER),
                rng.range(EDGE_BUFFER, HEIGHT - EDGE_BUFFER),
            );
            points.push(TrackedPoint::new(noise, frame, ts));
        }
    }

    let path = PathReconstructor::with_defaults().reconstruct(&points);
    assert_eq!(path.len(), 30);

    for p in &path.points {
        let err = p.position().distance(&true_position(p.frame_index));
        assert!(err < 15.0, "frame {} off by {err:.1}px", p.frame_index);
    }
}

#[test]
fn noise_only_frames_do_not_break_ordering() {
    let mut rng = XorShift(42);
    let mut points = Vec::new();
    for frame in (0..20u32).rev() {
        for _ in 0..3 {
            let p = Point2::new(rng.range(0.0, WIDTH), rng.range(0.0, HEIGHT));
            points.push(TrackedPoint::new(p, frame, frame as f64 * 66.0));
        }
    }

    let path = PathReconstructor::with_defaults().reconstruct(&points);
    assert_eq!(path.len(), 20);
    assert!(path
        .points
        .windows(2)
        .all(|w| w[0].frame_index < w[1].frame_index));
    assert!(path
        .points
        .iter()
        .all(|p| p.position().is_finite() && p.support >= 1));
}
