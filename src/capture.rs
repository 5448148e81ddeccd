//! Capture pipeline
//!
//! Drives a [`CaptureSource`] through every planned scroll position, stitches
//! the captures segment by segment and commits finished segments to a
//! [`SegmentStore`].
//!
//! The source lives on a dedicated worker thread and is driven through
//! commands answered over oneshot channels, so the pipeline only suspends
//! while waiting for the host to confirm a scroll and to return a raster.
//! Those two points are also where cancellation is observed. Stitching runs
//! on a blocking task, pipelined one capture behind: while capture N is being
//! composited, capture N+1 is being taken, and never more than one stitch is
//! in flight. If anything fails, every segment already persisted for the
//! capture is deleted before the error is returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use image::RgbaImage;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::planning::{plan_capture, CaptureStrategy};
use crate::stitch::SegmentCanvas;
use crate::store::{SegmentMeta, SegmentStore};
use crate::{CaptureConfig, CaptureSource, Error, PageGeometry, Result};

enum Command {
    Geometry(oneshot::Sender<Result<PageGeometry>>),
    ScrollTo(u32, oneshot::Sender<Result<()>>),
    Capture(oneshot::Sender<Result<RgbaImage>>),
    Restore(oneshot::Sender<Result<()>>),
}

/// Handle to the worker thread that owns the capture source
struct SourceWorker {
    cmd_tx: Sender<Command>,
}

impl SourceWorker {
    fn spawn<S: CaptureSource>(mut source: S) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();

        thread::spawn(move || {
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::Geometry(resp) => {
                        let _ = resp.send(source.geometry());
                    }
                    Command::ScrollTo(y, resp) => {
                        let _ = resp.send(source.scroll_to(y));
                    }
                    Command::Capture(resp) => {
                        let _ = resp.send(source.capture_viewport());
                    }
                    Command::Restore(resp) => {
                        let _ = resp.send(source.restore());
                        break;
                    }
                }
            }
        });

        Self { cmd_tx }
    }

    async fn request<T>(
        &self,
        what: &str,
        make: impl FnOnce(oneshot::Sender<Result<T>>) -> Command,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .map_err(|_| Error::Capture(format!("{}: capture worker has stopped", what)))?;
        rx.await
            .map_err(|e| Error::Capture(format!("{} canceled: {}", what, e)))?
    }

    async fn geometry(&self) -> Result<PageGeometry> {
        self.request("Geometry", Command::Geometry).await
    }

    async fn scroll_to(&self, y: u32) -> Result<()> {
        self.request("Scroll", |tx| Command::ScrollTo(y, tx)).await
    }

    async fn capture(&self) -> Result<RgbaImage> {
        self.request("Capture", Command::Capture).await
    }

    async fn restore(&self) -> Result<()> {
        self.request("Restore", Command::Restore).await
    }
}

/// Cooperative cancellation, observed at the pipeline's suspension points
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, at: &str) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled(at.to_string()))
        } else {
            Ok(())
        }
    }
}

/// Enforces the host's minimum interval between two captures
struct CapturePacer {
    interval: Duration,
    last: Option<Instant>,
}

impl CapturePacer {
    fn new(interval_ms: u64) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            last: None,
        }
    }

    async fn wait(&mut self) {
        if let Some(last) = self.last {
            tokio::time::sleep_until(last + self.interval).await;
        }
        self.last = Some(Instant::now());
    }
}

/// Result of a successful capture
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureOutcome {
    pub capture_id: String,
    pub geometry: PageGeometry,
    pub strategy: CaptureStrategy,
    /// Committed segments, in order
    pub segments: Vec<SegmentMeta>,
}

/// Capture a full page into segments.
///
/// On success every segment is in `store` under `config.capture_id`. On
/// failure or cancellation none are: the capture is discarded as a whole.
pub async fn capture_page<S, St>(
    source: S,
    store: &St,
    config: &CaptureConfig,
    cancel: CancelFlag,
) -> Result<CaptureOutcome>
where
    S: CaptureSource,
    St: SegmentStore + ?Sized,
{
    let worker = SourceWorker::spawn(source);
    let result = run_capture(&worker, store, config, &cancel).await;

    if let Err(e) = worker.restore().await {
        warn!("Failed to restore page after capture '{}': {}", config.capture_id, e);
    }

    match result {
        Ok(outcome) => Ok(outcome),
        Err(err) => {
            warn!("Capture '{}' aborted: {}", config.capture_id, err);
            if let Err(cleanup) = store.delete_capture(&config.capture_id) {
                warn!("Failed to discard segments of '{}': {}", config.capture_id, cleanup);
            }
            Err(err)
        }
    }
}

async fn join_stitch(handle: JoinHandle<Result<SegmentCanvas>>) -> Result<SegmentCanvas> {
    handle
        .await
        .map_err(|e| Error::StitchFailed(format!("stitch task failed: {}", e)))?
}

async fn run_capture<St>(
    worker: &SourceWorker,
    store: &St,
    config: &CaptureConfig,
    cancel: &CancelFlag,
) -> Result<CaptureOutcome>
where
    St: SegmentStore + ?Sized,
{
    let geometry = worker.geometry().await?;
    let (strategy, segments) = plan_capture(&geometry, &config.limits)?;

    // Never mix segments of an earlier run under the same id.
    store.delete_capture(&config.capture_id)?;

    let settle = Duration::from_millis(config.scroll_settle_ms);
    let mut pacer = CapturePacer::new(config.min_capture_interval_ms);
    let mut committed = Vec::with_capacity(segments.len());

    for segment in &segments {
        let canvas = SegmentCanvas::new(
            segment,
            &strategy,
            geometry.viewport_width,
            geometry.viewport_height,
        )?;
        let mut idle = Some(canvas);
        let mut in_flight: Option<JoinHandle<Result<SegmentCanvas>>> = None;

        for &y in &segment.positions {
            cancel.check("before scroll")?;
            worker.scroll_to(y).await?;
            if !settle.is_zero() {
                tokio::time::sleep(settle).await;
            }

            pacer.wait().await;
            let capture = worker.capture().await?;
            cancel.check("after capture")?;
            debug!(
                "Captured {}x{} viewport at y={} for segment {}",
                capture.width(),
                capture.height(),
                y,
                segment.index
            );

            let mut target = match in_flight.take() {
                Some(handle) => join_stitch(handle).await?,
                None => idle
                    .take()
                    .ok_or_else(|| Error::Other("segment canvas lost".into()))?,
            };
            in_flight = Some(tokio::task::spawn_blocking(move || {
                target.apply(&capture, y)?;
                Ok(target)
            }));
        }

        let finished = match in_flight.take() {
            Some(handle) => join_stitch(handle).await?,
            None => idle
                .take()
                .ok_or_else(|| Error::Other("segment canvas lost".into()))?,
        };
        debug!(
            "Segment {} stitched down to row {} of {}",
            finished.segment().index,
            finished.cursor().last_drawn_bottom_y,
            finished.dimensions().1
        );
        let raster = finished.finish(&config.capture_id);
        store.put(&raster)?;
        info!(
            "Committed segment {} of '{}' ({}x{}, page rows {}..{})",
            raster.meta.index,
            config.capture_id,
            raster.meta.width,
            raster.meta.height,
            raster.meta.y_start,
            raster.meta.y_end
        );
        committed.push(raster.meta);
    }

    Ok(CaptureOutcome {
        capture_id: config.capture_id.clone(),
        geometry,
        strategy,
        segments: committed,
    })
}
