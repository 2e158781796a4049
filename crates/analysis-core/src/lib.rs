//! barpath Analysis Core
//!
//! Turns raw tracked feature points into lift metrics:
//! - **Path Reconstruction:** one robust bar estimate per frame from a noisy point cloud
//! - **Smoothing:** velocity series smoothing for phase detection
//! - **Velocity Analysis:** instantaneous, mean and peak velocity over the concentric phase
//! - **Power Zones:** classification of mean velocity into training zones
//!
//! This crate is pure computation with no I/O.
//! All inputs are data; all outputs are data.

pub mod path;
pub mod smoothing;
pub mod velocity;
pub mod zones;

pub use path::{PathConfig, PathReconstructor};
pub use smoothing::SmoothingAlgorithm;
pub use velocity::{VelocityAnalyzer, VelocityConfig};
pub use zones::{PowerZoneBand, PowerZoneTable};
