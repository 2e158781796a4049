//! Application configuration.
//!
//! User-level preferences live here. Algorithm tuning (detection
//! thresholds, flow parameters, velocity table) belongs to the crates that
//! own those algorithms and is aggregated by the tracking engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BarpathError, BarpathResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Frame sampling settings.
    pub sampling: SamplingConfig,

    /// Optional AI hint service.
    pub hints: HintServiceConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Optional engine tuning file (JSON) overriding algorithm defaults.
    pub tuning_file: Option<PathBuf>,
}

/// How frames are pulled out of the source video.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Fixed analysis rate in frames per second.
    pub target_fps: f64,

    /// Frames are scaled down to fit within this box before tracking.
    pub max_width: u32,

    /// See `max_width`.
    pub max_height: u32,

    /// Frame count assumed when neither the container nor probing yields a duration.
    pub fallback_frame_count: u32,
}

/// Remote hint service settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HintServiceConfig {
    /// Whether hints are requested at all.
    pub enabled: bool,

    /// Base URL of the service (e.g., "http://localhost:5000").
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Frames sent to the service are downscaled to this size on the long edge.
    pub max_dimension: u32,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "barpath_vision_core=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sampling: SamplingConfig::default(),
            hints: HintServiceConfig::default(),
            logging: LoggingConfig::default(),
            tuning_file: None,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            target_fps: 15.0,
            max_width: 720,
            max_height: 540,
            fallback_frame_count: 30,
        }
    }
}

impl SamplingConfig {
    /// Reject values no decoder could honor.
    pub fn validate(&self) -> BarpathResult<()> {
        if !(self.target_fps > 0.0 && self.target_fps.is_finite()) {
            return Err(BarpathError::config(format!(
                "target_fps must be positive, got {}",
                self.target_fps
            )));
        }
        if self.max_width < 2 || self.max_height < 2 {
            return Err(BarpathError::config("max frame dimensions must be at least 2x2"));
        }
        Ok(())
    }

    /// Fit `(width, height)` inside the configured box, preserving aspect
    /// ratio and rounding to even dimensions for the decoder's scaler.
    pub fn fit_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width, height);
        }
        let scale = (self.max_width as f64 / width as f64)
            .min(self.max_height as f64 / height as f64)
            .min(1.0);
        let even = |v: f64| ((v.round() as u32) / 2 * 2).max(2);
        (even(width as f64 * scale), even(height as f64 * scale))
    }
}

impl Default for HintServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            timeout_secs: 30,
            max_dimension: 800,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], errors are returned.
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

    /// Reject settings that cannot work together.
    pub fn validate(&self) -> BarpathResult<()> {
        self.sampling.validate()?;
        let has_endpoint = self
            .hints
            .endpoint
            .as_deref()
            .is_some_and(|e| !e.trim().is_empty());
        if self.hints.enabled && !has_endpoint {
            return Err(BarpathError::config("hints are enabled but no endpoint is set"));
        }
        if self.hints.max_dimension < 64 {
            return Err(BarpathError::config(format!(
                "hint max_dimension must be at least 64, got {}",
                self.hints.max_dimension
            )));
        }
        Ok(())
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("barpath").join("config.json")
}
