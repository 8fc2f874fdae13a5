//! Media Pipeline
//!
//! Camera acquisition, frame sampling and snapshot encoding.

use image::{imageops, RgbaImage};
use std::sync::atomic::{AtomicU64, Ordering};

pub mod camera;
pub mod capture;
pub mod snapshot;

pub use camera::{CameraAcquirer, CameraDevice, CameraError, ReplayCamera, StillCamera};
pub use capture::{CancelToken, CaptureError, FrameCapturer};
pub use snapshot::{Snapshot, SnapshotError};

/// Global frame ID counter for unique frame identification
static FRAME_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a new unique frame ID
pub fn next_frame_id() -> u64 {
    FRAME_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Camera frame in native resolution
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Unique frame ID (monotonically increasing)
    pub frame_id: u64,
    pub width: u32,
    pub height: u32,
    /// RGBA8, tightly packed, row-major
    pub rgba: Vec<u8>,
}

impl VideoFrame {
    /// Wrap an RGBA buffer
    pub fn from_rgba(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self {
            frame_id: next_frame_id(),
            width,
            height,
            rgba,
        }
    }

    /// Opaque black frame
    pub fn empty(width: u32, height: u32) -> Self {
        let mut rgba = vec![0u8; (width as usize) * (height as usize) * 4];
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 255;
        }
        Self::from_rgba(width, height, rgba)
    }

    /// True when the frame has non-zero size and a complete pixel buffer.
    /// Frames that fail this are treated like a video element whose metadata
    /// has not loaded yet.
    pub fn has_dimensions(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgba.len() >= (self.width as usize) * (self.height as usize) * 4
    }

    /// View the pixel data as an image buffer
    pub fn to_image(&self) -> Option<RgbaImage> {
        if !self.has_dimensions() {
            return None;
        }
        let len = (self.width as usize) * (self.height as usize) * 4;
        RgbaImage::from_raw(self.width, self.height, self.rgba[..len].to_vec())
    }

    /// Draw the frame onto a canvas of the given size, scaling when the
    /// canvas does not match the native resolution. A frame without
    /// dimensions leaves the canvas blank.
    pub fn draw_to_canvas(&self, width: u32, height: u32) -> RgbaImage {
        match self.to_image() {
            Some(img) if img.width() == width && img.height() == height => img,
            Some(img) => imageops::resize(&img, width, height, imageops::FilterType::Triangle),
            None => blank_canvas(width, height),
        }
    }
}

/// Canvas with nothing drawn on it yet (opaque black, as a JPEG export would show it)
pub fn blank_canvas(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255]))
}
