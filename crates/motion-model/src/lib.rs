//! barpath Motion Model
//!
//! Defines the data contracts shared by every stage of the engine:
//! - **Frames:** validated RGBA buffers with explicit dimensions
//! - **Geometry:** pixel-space points and regions
//! - **Calibration:** the pixels-per-millimeter scale and how it was found
//! - **Tracking:** per-frame feature positions and the reconstructed path
//! - **Analysis:** velocity profile, concentric phase, and power zone
//! - **Hints:** advisory region and scale proposals
//!
//! All coordinates are in frame pixels with `y` growing downward.

pub mod analysis;
pub mod calibration;
pub mod frame;
pub mod geometry;
pub mod hints;
pub mod tracking;

pub use analysis::*;
pub use calibration::*;
pub use frame::*;
pub use geometry::*;
pub use hints::*;
pub use tracking::*;
