//! Frame Capture
//!
//! Samples the live video at a fixed rate for a fixed duration and returns
//! the encoded snapshots in capture order.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};

use super::snapshot::{Snapshot, SnapshotError};
use super::blank_canvas;
use crate::app::SharedFrame;

/// Canvas size used when the video has no dimensions yet
pub const FALLBACK_RESOLUTION: (u32, u32) = (640, 480);

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("a capture is already running")]
    Busy,
    #[error("capture cancelled")]
    Cancelled,
    #[error("frame rate must be positive")]
    InvalidRate,
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("encoder task failed: {0}")]
    Encoder(#[from] tokio::task::JoinError),
}

/// Cancellation signal shared between the capture and whoever may abort it
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick interval in milliseconds and number of frames for a capture.
/// Computed in floating point so that e.g. 2500 ms at 8 fps yields exactly
/// `floor(2500 / 125) = 20` frames.
pub fn capture_plan(duration_ms: u64, fps: u32) -> (f64, usize) {
    let interval_ms = 1000.0 / fps as f64;
    let total_frames = (duration_ms as f64 / interval_ms).floor() as usize;
    (interval_ms, total_frames)
}

/// Samples the live video. Only one capture may run at a time.
pub struct FrameCapturer {
    video: Arc<SharedFrame>,
    jpeg_quality: u8,
    fallback: (u32, u32),
    busy: AtomicBool,
}

struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl FrameCapturer {
    pub fn new(video: Arc<SharedFrame>, jpeg_quality: u8) -> Self {
        Self {
            video,
            jpeg_quality,
            fallback: FALLBACK_RESOLUTION,
            busy: AtomicBool::new(false),
        }
    }

    /// Override the canvas size used when the video is not ready
    pub fn with_fallback(mut self, width: u32, height: u32) -> Self {
        self.fallback = (width, height);
        self
    }

    /// Capture `floor(duration_ms / (1000 / fps))` snapshots, one per tick.
    /// The canvas keeps the size the video had when the capture started.
    /// A plan of zero frames returns at once.
    pub async fn capture_frames(
        &self,
        duration_ms: u64,
        fps: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<Snapshot>, CaptureError> {
        if fps == 0 {
            return Err(CaptureError::InvalidRate);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(CaptureError::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let (interval_ms, total_frames) = capture_plan(duration_ms, fps);
        if total_frames == 0 {
            debug!("Capture of {} ms at {} fps has no frames", duration_ms, fps);
            return Ok(Vec::new());
        }
        let (width, height) = self.video.dimensions().unwrap_or(self.fallback);
        info!(
            "Capturing {} frames at {}x{} every {:.1} ms",
            total_frames, width, height, interval_ms
        );

        // interval_at panics on a zero period
        let period = Duration::from_secs_f64(interval_ms / 1000.0).max(Duration::from_nanos(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        let mut frames = Vec::with_capacity(total_frames);

        while frames.len() < total_frames {
            tokio::select! {
                _ = ticker.tick() => {
                    let latest = self.video.latest();
                    let quality = self.jpeg_quality;
                    let snapshot = tokio::task::spawn_blocking(move || {
                        let canvas = match latest {
                            Some(frame) => frame.draw_to_canvas(width, height),
                            None => blank_canvas(width, height),
                        };
                        Snapshot::encode_jpeg(&canvas, quality)
                    })
                    .await??;
                    frames.push(snapshot);
                }
                _ = cancel.cancelled() => {
                    info!("Capture cancelled after {} frames", frames.len());
                    return Err(CaptureError::Cancelled);
                }
            }
        }

        debug!("Capture finished with {} frames", frames.len());
        Ok(frames)
    }
}

#[cfg(test)]
impl FrameCapturer {
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::VideoFrame;

    fn capturer_with_frame(frame: Option<VideoFrame>) -> Arc<FrameCapturer> {
        let video = Arc::new(SharedFrame::new());
        if let Some(frame) = frame {
            video.write(frame);
        }
        Arc::new(FrameCapturer::new(video, 80))
    }

    #[test]
    fn plan_matches_floor_of_duration_over_interval() {
        assert_eq!(capture_plan(2500, 8), (125.0, 20));
        for (duration, fps) in [(1000, 3), (999, 10), (1, 1000), (10_000, 7), (333, 30), (50, 8)] {
            let interval = 1000.0 / fps as f64;
            let expected = (duration as f64 / interval).floor() as usize;
            assert_eq!(capture_plan(duration, fps).1, expected, "{duration} ms @ {fps} fps");
        }
        assert_eq!(capture_plan(50, 8).1, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn default_capture_yields_twenty_frames_of_native_size() {
        let capturer = capturer_with_frame(Some(VideoFrame::empty(32, 24)));
        let frames = capturer
            .capture_frames(2500, 8, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(frames.len(), 20);
        let (_, bytes) = frames[0].decode().unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (32, 24));
        assert!(!capturer.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn capture_takes_the_configured_time() {
        let capturer = capturer_with_frame(Some(VideoFrame::empty(8, 8)));
        let start = Instant::now();
        let frames = capturer
            .capture_frames(1000, 4, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_video_falls_back_to_640x480() {
        let capturer = capturer_with_frame(None);
        let frames = capturer
            .capture_frames(250, 8, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(frames.len(), 2);
        let (_, bytes) = frames[1].decode().unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), FALLBACK_RESOLUTION);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_capture_is_busy() {
        let capturer = capturer_with_frame(Some(VideoFrame::empty(8, 8)));
        let running = {
            let capturer = Arc::clone(&capturer);
            tokio::spawn(async move { capturer.capture_frames(2500, 8, &CancelToken::new()).await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;

        let second = capturer.capture_frames(2500, 8, &CancelToken::new()).await;
        assert!(matches!(second, Err(CaptureError::Busy)));

        assert_eq!(running.await.unwrap().unwrap().len(), 20);
        assert!(capturer
            .capture_frames(125, 8, &CancelToken::new())
            .await
            .is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_and_frees_the_capturer() {
        let capturer = capturer_with_frame(Some(VideoFrame::empty(8, 8)));
        let cancel = CancelToken::new();
        let running = {
            let capturer = Arc::clone(&capturer);
            let cancel = cancel.clone();
            tokio::spawn(async move { capturer.capture_frames(2500, 8, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(400)).await;
        cancel.cancel();

        assert!(matches!(running.await.unwrap(), Err(CaptureError::Cancelled)));
        assert!(cancel.is_cancelled());
        assert!(!capturer.is_busy());
    }

    #[tokio::test]
    async fn empty_plan_returns_without_ticking() {
        let capturer = capturer_with_frame(Some(VideoFrame::empty(8, 8)));
        let frames = capturer
            .capture_frames(0, 2_000_000_000, &CancelToken::new())
            .await
            .unwrap();
        assert!(frames.is_empty());
        assert!(!capturer.is_busy());

        let frames = capturer
            .capture_frames(50, 8, &CancelToken::new())
            .await
            .unwrap();
        assert!(frames.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn very_high_rate_still_captures() {
        let capturer = capturer_with_frame(Some(VideoFrame::empty(4, 4)));
        let frames = capturer
            .capture_frames(2, 2000, &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(frames.len(), 4);
    }

    #[tokio::test]
    async fn zero_fps_is_rejected() {
        let capturer = capturer_with_frame(None);
        assert!(matches!(
            capturer.capture_frames(1000, 0, &CancelToken::new()).await,
            Err(CaptureError::InvalidRate)
        ));
    }
}
