//! barpath Vision Core
//!
//! Pure image computation, no I/O:
//! - **Planes:** grayscale conversion and sub-pixel `f32` sampling
//! - **Masks:** weighted detection masks (foreground ellipse, hint falloff, rectangle)
//! - **Corners:** Shi–Tomasi detection with a strict/relaxed retry policy
//! - **Flow:** sparse pyramidal Lucas–Kanade tracking
//! - **Calibration:** plate detection and scale resolution

pub mod calibration;
pub mod corners;
pub mod features;
pub mod flow;
pub mod mask;
pub mod plane;
pub mod plate;

pub use calibration::{CalibrationMode, CalibrationResolver, CalibrationSettings};
pub use corners::DetectionPass;
pub use features::{DetectionConfig, FeatureDetector, FeatureSet, MaskSource};
pub use flow::{track_points, FlowConfig, FlowResult, Pyramid};
pub use plane::to_gray;
