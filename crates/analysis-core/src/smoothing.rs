//! Velocity series smoothing.
//!
//! Applied to the instantaneous velocity series to absorb frame-to-frame
//! tracking jitter before phase detection and reporting.

use serde::{Deserialize, Serialize};

/// Available smoothing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SmoothingAlgorithm {
    /// Centered moving average over `window` samples; the window shrinks
    /// at both ends of the series.
    MovingAverage { window: usize },

    /// Exponential moving average.
    ///
    /// `strength` is in [0.0, 1.0], where larger values mean more smoothing.
    Ema { strength: f64 },

    /// No smoothing; pass through raw data.
    None,
}

impl Default for SmoothingAlgorithm {
    fn default() -> Self {
        Self::MovingAverage { window: 3 }
    }
}

/// Smooth `series` with `algorithm`. Output has the same length.
pub fn smooth(series: &[f64], algorithm: SmoothingAlgorithm) -> Vec<f64> {
    match algorithm {
        SmoothingAlgorithm::MovingAverage { window } => moving_average(series, window),
        SmoothingAlgorithm::Ema { strength } => ema(series, strength),
        SmoothingAlgorithm::None => series.to_vec(),
    }
}

fn moving_average(series: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || series.len() < window {
        return series.to_vec();
    }
    let half = window / 2;
    (0..series.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(series.len());
            let slice = &series[start..end];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

fn ema(series: &[f64], strength: f64) -> Vec<f64> {
    let alpha = 1.0 - strength.clamp(0.0, 0.99);
    let mut out = Vec::with_capacity(series.len());
    let mut state: Option<f64> = None;
    for &v in series {
        let next = match state {
            None => v,
            Some(prev) => prev + alpha * (v - prev),
        };
        state = Some(next);
        out.push(next);
    }
    out
}
