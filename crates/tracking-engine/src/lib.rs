//! barpath Tracking Engine
//!
//! Turns a lift video into an [`AnalysisResult`](barpath_motion_model::AnalysisResult):
//! - **Session:** calibration, live feature set and reference frame for one analysis
//! - **Worker:** the session on its own thread behind an async request protocol
//! - **Sources:** sampled frames from memory or from an `ffmpeg` decoder
//! - **Pipeline:** hints, initialization, per-frame tracking, reconstruction and analysis
//!
//! Only one session is live per worker. `reset` invalidates it at once;
//! replies belonging to an older session surface as `SessionReset`.

pub mod config;
pub mod pipeline;
pub mod session;
pub mod source;
pub mod video;
pub mod worker;

pub use config::{EngineConfig, TrackingConfig};
pub use pipeline::{
    AnalysisOptions, AnalysisOutput, AnalysisPipeline, AnalysisProgress, AnalysisStage,
    CancelToken, ProgressCallback,
};
pub use session::{InitializeResponse, SessionState, SessionStats, TrackingSession};
pub use source::{FrameSource, MemoryFrameSource, VideoInfo};
pub use video::{command_exists, probe_video, FfmpegFrameSource, ProbeReport};
pub use worker::{EngineHandle, PendingReply};
