//! Sampling clock utilities.
//!
//! Frames arrive at the source's native rate; analysis runs at a fixed
//! target rate. Timestamps are carried in milliseconds as `f64` because
//! decoders report fractional presentation times.

/// Frame rate controller for downsampling a timestamped stream.
#[derive(Debug)]
pub struct RateController {
    target_interval_ms: f64,
    next_tick_ms: Option<f64>,
}

impl RateController {
    /// Create a controller targeting the given rate in Hz.
    ///
    /// A non-positive rate disables downsampling (every frame ticks).
    pub fn new(target_hz: f64) -> Self {
        let target_interval_ms = if target_hz > 0.0 && target_hz.is_finite() {
            1000.0 / target_hz
        } else {
            0.0
        };
        Self {
            target_interval_ms,
            next_tick_ms: None,
        }
    }

    /// Check if the frame at `current_ms` should be emitted.
    /// Returns true and updates internal state if ready.
    /// The first call always returns true.
    ///
    /// Ticks are scheduled on a fixed grid anchored at the first frame so
    /// jitter in the source timestamps does not accumulate.
    pub fn should_tick(&mut self, current_ms: f64) -> bool {
        // Half a millisecond of slack absorbs rounding in container timestamps.
        const SLACK_MS: f64 = 0.5;
        match self.next_tick_ms {
            None => {
                self.next_tick_ms = Some(current_ms + self.target_interval_ms);
                true
            }
            Some(next) if current_ms + SLACK_MS >= next => {
                let mut upcoming = next + self.target_interval_ms;
                while self.target_interval_ms > 0.0 && upcoming <= current_ms {
                    upcoming += self.target_interval_ms;
                }
                self.next_tick_ms = Some(upcoming);
                true
            }
            _ => false,
        }
    }

    /// Target interval in milliseconds.
    pub fn interval_ms(&self) -> f64 {
        self.target_interval_ms
    }

    /// Forget the schedule; the next frame ticks unconditionally.
    pub fn reset(&mut self) {
        self.next_tick_ms = None;
    }
}

/// Convert a frame index at a fixed rate to a timestamp in milliseconds.
pub fn frame_timestamp_ms(frame_index: u32, fps: f64) -> f64 {
    if fps <= 0.0 {
        return 0.0;
    }
    frame_index as f64 * 1000.0 / fps
}

/// Convert milliseconds to seconds.
pub fn ms_to_secs(ms: f64) -> f64 {
    ms / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_controller_downsamples_30_to_15() {
        let mut ctrl = RateController::new(15.0);
        let emitted: Vec<u32> = (0..30u32)
            .filter(|i| ctrl.should_tick(frame_timestamp_ms(*i, 30.0)))
            .collect();
        assert_eq!(emitted.len(), 15);
        assert_eq!(emitted[0], 0);
        assert_eq!(emitted[1], 2);
    }

    #[test]
    fn test_rate_controller_passes_slower_stream() {
        let mut ctrl = RateController::new(15.0);
        let emitted = (0..10u32)
            .filter(|i| ctrl.should_tick(frame_timestamp_ms(*i, 10.0)))
            .count();
        assert_eq!(emitted, 10);
    }

    #[test]
    fn test_rate_controller_first_tick_and_reset() {
        let mut ctrl = RateController::new(60.0);
        assert!(ctrl.should_tick(0.0));
        assert!(!ctrl.should_tick(1.0));
        assert!(ctrl.should_tick(17.0));
        ctrl.reset();
        assert!(ctrl.should_tick(18.0));
    }

    #[test]
    fn test_zero_rate_ticks_every_frame() {
        let mut ctrl = RateController::new(0.0);
        assert!(ctrl.should_tick(0.0));
        assert!(ctrl.should_tick(0.0));
        assert!(ctrl.should_tick(1.0));
    }

    #[test]
    fn test_frame_timestamp() {
        assert!((frame_timestamp_ms(15, 30.0) - 500.0).abs() < 1e-9);
        assert_eq!(frame_timestamp_ms(3, 0.0), 0.0);
        assert!((ms_to_secs(1500.0) - 1.5).abs() < 1e-12);
    }
}
