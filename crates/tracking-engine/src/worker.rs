//! Tracking worker: an isolated thread that owns a [`TrackingSession`].
//!
//! Callers talk to it through [`EngineHandle`], which sends requests over a
//! bounded channel and awaits one-shot replies. Requests are processed
//! strictly in order. Every request carries the session generation it was
//! issued under; `reset` bumps the generation immediately, so work queued
//! or finished for an older generation comes back as `SessionReset`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{CalibrationHint, Region, RegionHint, RgbaFrame, TrackedPoint};
use barpath_vision_core::CalibrationSettings;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::EngineConfig;
use crate::session::{InitializeResponse, SessionStats, TrackingSession};

const REQUEST_QUEUE_DEPTH: usize = 8;

enum Request {
    Initialize {
        frame: RgbaFrame,
        settings: CalibrationSettings,
        calibration_hint: Option<CalibrationHint>,
        region_hint: Option<RegionHint>,
        reply: oneshot::Sender<BarpathResult<InitializeResponse>>,
    },
    ProcessFrame {
        frame: RgbaFrame,
        frame_index: u32,
        timestamp_ms: f64,
        reply: oneshot::Sender<BarpathResult<Vec<TrackedPoint>>>,
    },
    SelectRegion {
        region: Region,
        reply: oneshot::Sender<BarpathResult<usize>>,
    },
    Reset {
        reply: oneshot::Sender<BarpathResult<()>>,
    },
    Finalize {
        reply: oneshot::Sender<BarpathResult<SessionStats>>,
    },
}

struct Envelope {
    generation: u64,
    request: Request,
}

/// A reply that has been requested but not yet awaited.
pub struct PendingReply<T> {
    generation: u64,
    current: Arc<AtomicU64>,
    rx: oneshot::Receiver<BarpathResult<T>>,
}

impl<T> PendingReply<T> {
    /// Wait for the worker's answer. Answers for a session that has since
    /// been reset are discarded.
    pub async fn wait(self) -> BarpathResult<T> {
        let result = self.rx.await.map_err(|_| worker_gone())?;
        if self.current.load(Ordering::SeqCst) != self.generation {
            tracing::debug!(generation = self.generation, "Discarding stale reply");
            return Err(BarpathError::SessionReset {
                generation: self.generation,
            });
        }
        result
    }
}

fn worker_gone() -> BarpathError {
    BarpathError::engine("tracking worker has stopped")
}

/// Async handle to the tracking worker.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<Envelope>,
    generation: Arc<AtomicU64>,
}

impl EngineHandle {
    /// Start a worker on the blocking thread pool. Must be called from
    /// within a Tokio runtime.
    pub fn spawn(config: &EngineConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let generation = Arc::new(AtomicU64::new(0));
        let session = TrackingSession::new(config);
        let worker_generation = Arc::clone(&generation);
        let join = tokio::task::spawn_blocking(move || run_worker(session, rx, worker_generation));
        (Self { tx, generation }, join)
    }

    /// Current session generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    async fn submit<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<BarpathResult<T>>) -> Request,
    ) -> BarpathResult<PendingReply<T>> {
        let (reply, rx) = oneshot::channel();
        let generation = self.generation();
        self.tx
            .send(Envelope {
                generation,
                request: make(reply),
            })
            .await
            .map_err(|_| worker_gone())?;
        Ok(PendingReply {
            generation,
            current: Arc::clone(&self.generation),
            rx,
        })
    }

    pub async fn initialize(
        &self,
        frame: RgbaFrame,
        settings: CalibrationSettings,
        calibration_hint: Option<CalibrationHint>,
        region_hint: Option<RegionHint>,
    ) -> BarpathResult<InitializeResponse> {
        self.submit(|reply| Request::Initialize {
            frame,
            settings,
            calibration_hint,
            region_hint,
            reply,
        })
        .await?
        .wait()
        .await
    }

    /// Queue a frame without waiting for its result.
    pub async fn submit_frame(
        &self,
        frame: RgbaFrame,
        frame_index: u32,
        timestamp_ms: f64,
    ) -> BarpathResult<PendingReply<Vec<TrackedPoint>>> {
        self.submit(|reply| Request::ProcessFrame {
            frame,
            frame_index,
            timestamp_ms,
            reply,
        })
        .await
    }

    pub async fn process_frame(
        &self,
        frame: RgbaFrame,
        frame_index: u32,
        timestamp_ms: f64,
    ) -> BarpathResult<Vec<TrackedPoint>> {
        self.submit_frame(frame, frame_index, timestamp_ms)
            .await?
            .wait()
            .await
    }

    /// Re-seed features inside `(x, y, width, height)`; returns the live
    /// feature count.
    pub async fn select_region(
        &self,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> BarpathResult<usize> {
        let region = Region::new(x, y, width, height);
        self.submit(|reply| Request::SelectRegion { region, reply })
            .await?
            .wait()
            .await
    }

    /// Invalidate the current session. Takes effect for callers
    /// immediately, before the worker has processed the request.
    ///
    /// A later reset overtaking this one still counts as success.
    pub async fn reset(&self) -> BarpathResult<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::debug!(generation, "Session reset requested");
        match self.submit(|reply| Request::Reset { reply }).await?.wait().await {
            Err(BarpathError::SessionReset { .. }) => Ok(()),
            other => other,
        }
    }

    pub async fn finalize(&self) -> BarpathResult<SessionStats> {
        self.submit(|reply| Request::Finalize { reply })
            .await?
            .wait()
            .await
    }
}

fn run_worker(mut session: TrackingSession, mut rx: mpsc::Receiver<Envelope>, generation: Arc<AtomicU64>) {
    tracing::debug!("Tracking worker started");
    while let Some(Envelope {
        generation: issued,
        request,
    }) = rx.blocking_recv()
    {
        let stale = issued != generation.load(Ordering::SeqCst);
        // A dropped receiver only means the caller stopped waiting.
        match request {
            Request::Reset { reply } => {
                session.reset();
                let _ = reply.send(Ok(()));
            }
            Request::Initialize { reply, .. } if stale => {
                let _ = reply.send(Err(BarpathError::SessionReset { generation: issued }));
            }
            Request::ProcessFrame { reply, .. } if stale => {
                let _ = reply.send(Err(BarpathError::SessionReset { generation: issued }));
            }
            Request::SelectRegion { reply, .. } if stale => {
                let _ = reply.send(Err(BarpathError::SessionReset { generation: issued }));
            }
            Request::Finalize { reply } if stale => {
                let _ = reply.send(Err(BarpathError::SessionReset { generation: issued }));
            }
            Request::Initialize {
                frame,
                settings,
                calibration_hint,
                region_hint,
                reply,
            } => {
                let result = session.initialize(
                    &frame,
                    &settings,
                    calibration_hint.as_ref(),
                    region_hint.as_ref(),
                );
                let _ = reply.send(result);
            }
            Request::ProcessFrame {
                frame,
                frame_index,
                timestamp_ms,
                reply,
            } => {
                let result = session.process_frame(&frame, frame_index, timestamp_ms);
                let _ = reply.send(result);
            }
            Request::SelectRegion { region, reply } => {
                let _ = reply.send(session.select_region(region));
            }
            Request::Finalize { reply } => {
                let _ = reply.send(session.finalize());
            }
        }
    }
    tracing::debug!("Tracking worker stopped");
}
