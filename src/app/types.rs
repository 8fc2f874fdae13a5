//! Application Types
//!
//! Common types used across the application.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::media::VideoFrame;

/// Latest-frame holder standing in for the live video element.
/// The camera pump writes, the scanner and capturer peek. No buffering.
pub struct SharedFrame {
    frame: Mutex<Option<Arc<VideoFrame>>>,
    frame_count: AtomicU64,
    ready: watch::Sender<bool>,
}

impl SharedFrame {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            frame: Mutex::new(None),
            frame_count: AtomicU64::new(0),
            ready,
        }
    }

    /// Write a new frame (called by the camera pump)
    pub fn write(&self, frame: VideoFrame) {
        *self.frame.lock() = Some(Arc::new(frame));
        self.frame_count.fetch_add(1, Ordering::Release);
        self.ready.send_if_modified(|ready| !std::mem::replace(ready, true));
    }

    /// Current frame, if a stream is bound and has delivered one
    pub fn latest(&self) -> Option<Arc<VideoFrame>> {
        self.frame.lock().clone()
    }

    /// Native resolution of the current frame, if it has usable dimensions
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frame
            .lock()
            .as_ref()
            .filter(|f| f.has_dimensions())
            .map(|f| (f.width, f.height))
    }

    /// Unbind: drop the current frame
    pub fn clear(&self) {
        *self.frame.lock() = None;
        self.ready.send_replace(false);
    }

    /// Wait until a frame has been written since the last bind
    pub async fn wait_for_frame(&self) {
        let mut rx = self.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }

    /// Get frame count for stats
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }
}

impl Default for SharedFrame {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-subject state of the verification page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Code decoded by the scanner
    pub qr_code: Option<String>,
    /// Manual entry field
    pub qr_input: String,
    /// Whether the scanner loop is polling
    pub scanning: bool,
    /// Whether the verify action is enabled
    pub action_enabled: bool,
}

impl SessionState {
    /// The code to verify: scanned value first, then the manual field
    pub fn effective_qr(&self) -> Option<String> {
        self.qr_code
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .or_else(|| Some(self.qr_input.trim()).filter(|c| !c.is_empty()))
            .map(str::to_string)
    }

    /// Forget the current subject
    pub fn reset(&mut self) {
        self.qr_code = None;
        self.qr_input.clear();
        self.action_enabled = false;
    }
}

/// Verification orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrchestratorState {
    #[default]
    Ready,
    Capturing,
    Submitting,
    DisplayingResult,
}

/// Actions the kiosk front-end can trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiAction {
    /// Press the verify button
    Verify,
    /// Type into the manual QR field
    EnterCode(String),
    /// Leave the page
    Quit,
}
