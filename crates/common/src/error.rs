//! Error types shared across barpath crates.

use std::path::PathBuf;

/// Top-level error type for barpath operations.
#[derive(Debug, thiserror::Error)]
pub enum BarpathError {
    /// No plausible calibration reference could be resolved.
    #[error("Calibration error: {message}")]
    Calibration { message: String },

    /// Zero trackable points after both detection passes.
    #[error("No features detected: {message}")]
    NoFeaturesDetected { message: String },

    /// Frame dimensions changed between consecutive frames.
    ///
    /// Recovered internally by reinitializing; never fatal to a session.
    #[error("Dimension mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    #[error("Optical flow failed: {message}")]
    FlowComputation { message: String },

    #[error("Invalid frame: {message}")]
    InvalidFrame { message: String },

    #[error("Tracking not initialized")]
    NotInitialized,

    /// A response belonged to a session that has since been reset.
    #[error("Session was reset (generation {generation})")]
    SessionReset { generation: u64 },

    #[error("Analysis cancelled")]
    Cancelled,

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Hint provider error: {message}")]
    Hint { message: String },

    #[error("Analysis error: {message}")]
    Analysis { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Engine error: {message}")]
    Engine { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using BarpathError.
pub type BarpathResult<T> = Result<T, BarpathError>;

impl BarpathError {
    pub fn calibration(msg: impl Into<String>) -> Self {
        Self::Calibration {
            message: msg.into(),
        }
    }

    pub fn no_features(msg: impl Into<String>) -> Self {
        Self::NoFeaturesDetected {
            message: msg.into(),
        }
    }

    pub fn flow(msg: impl Into<String>) -> Self {
        Self::FlowComputation {
            message: msg.into(),
        }
    }

    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn hint(msg: impl Into<String>) -> Self {
        Self::Hint {
            message: msg.into(),
        }
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::Engine {
            message: msg.into(),
        }
    }

    /// Whether this error must abort session start rather than skip one frame.
    pub fn is_fatal_at_start(&self) -> bool {
        matches!(
            self,
            Self::Calibration { .. } | Self::NoFeaturesDetected { .. } | Self::InvalidFrame { .. }
        )
    }

    /// Whether the orchestrator may log this error and continue with the next frame.
    pub fn is_frame_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NoFeaturesDetected { .. }
                | Self::DimensionMismatch { .. }
                | Self::FlowComputation { .. }
                | Self::InvalidFrame { .. }
        )
    }
}
