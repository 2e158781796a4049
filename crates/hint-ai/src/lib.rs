//! barpath Hint Intelligence
//!
//! Optional, advisory inputs from an external vision service:
//! - **Region hints:** a bounding box around the barbell to focus feature detection
//! - **Calibration hints:** a pixels-per-millimeter proposal for the scene
//!
//! Hints never gate the deterministic path. Callers compare confidence
//! against their own thresholds and fall back when a hint is missing, weak
//! or the service is unreachable.

pub mod encode;
pub mod http;
pub mod provider;

pub use http::HttpHintProvider;
pub use provider::{FixedHintProvider, HintProvider};
