//! Engine tuning: every algorithm's parameters in one serde tree.

use std::path::Path;

use barpath_analysis_core::{PathConfig, VelocityConfig};
use barpath_common::config::{AppConfig, SamplingConfig};
use barpath_common::error::{BarpathError, BarpathResult};
use barpath_vision_core::{CalibrationSettings, DetectionConfig, FlowConfig};
use serde::{Deserialize, Serialize};

/// Per-frame tracking policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Points closer than this to any frame edge are dropped.
    pub edge_buffer_px: f64,

    /// Upper bound on points tracked per frame.
    pub max_points: usize,

    /// Survivor count at which the feature set is rebuilt from survivors.
    pub min_survivors: usize,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            edge_buffer_px: 30.0,
            max_points: 50,
            min_survivors: 2,
        }
    }
}

/// Full engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub sampling: SamplingConfig,
    pub calibration: CalibrationSettings,
    pub detection: DetectionConfig,
    pub flow: FlowConfig,
    pub tracking: TrackingConfig,
    pub path: PathConfig,
    pub velocity: VelocityConfig,
}

impl EngineConfig {
    /// Load tuning from a JSON file. Missing sections take their defaults.
    pub fn load_from(path: &Path) -> BarpathResult<Self> {
        if !path.exists() {
            return Err(BarpathError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Engine configuration for an application config: the tuning file if
    /// one is set, with the application's sampling settings on top.
    pub fn from_app(app: &AppConfig) -> BarpathResult<Self> {
        let mut config = match &app.tuning_file {
            Some(path) => Self::load_from(path)?,
            None => Self::default(),
        };
        config.sampling = app.sampling.clone();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BarpathResult<()> {
        self.sampling.validate()?;
        if !(self.calibration.plate_diameter_mm.is_finite() && self.calibration.plate_diameter_mm > 0.0)
        {
            return Err(BarpathError::config("plate_diameter_mm must be positive"));
        }
        if self.flow.window_size < 3 || self.flow.window_size % 2 == 0 {
            return Err(BarpathError::config(format!(
                "flow window_size must be odd and at least 3, got {}",
                self.flow.window_size
            )));
        }
        if self.flow.max_iterations == 0 {
            return Err(BarpathError::config("flow max_iterations must be at least 1"));
        }
        if self.tracking.max_points == 0 {
            return Err(BarpathError::config("tracking max_points must be at least 1"));
        }
        if !(self.tracking.edge_buffer_px.is_finite() && self.tracking.edge_buffer_px >= 0.0) {
            return Err(BarpathError::config("tracking edge_buffer_px must be >= 0"));
        }
        if self.tracking.min_survivors < 2 {
            return Err(BarpathError::config("tracking min_survivors must be at least 2"));
        }
        if !(self.path.jump_blend >= 0.0 && self.path.jump_blend <= 1.0) {
            return Err(BarpathError::config("path jump_blend must be within [0, 1]"));
        }
        self.velocity.validate()
    }
}
