//! Camera Acquisition
//!
//! Opens a user-facing, video-only stream and pumps its frames into the
//! shared live-video holder that the scanner and capturer read from.

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::VideoFrame;
use crate::app::SharedFrame;
use crate::gui::{StatusKind, StatusPresenter};

pub const CAMERA_ERROR_STATUS: &str =
    "Cannot access the camera. Check the camera permissions and connection.";

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera permission denied")]
    PermissionDenied,
    #[error("no camera available: {0}")]
    NotFound(String),
    #[error("camera device error: {0}")]
    Device(String),
}

/// What to ask the device for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    /// Camera pointing at the person at the kiosk
    pub user_facing: bool,
    pub audio: bool,
}

impl StreamConstraints {
    pub fn front_video_only() -> Self {
        Self {
            user_facing: true,
            audio: false,
        }
    }
}

/// Live stream handed out by a device
pub trait VideoStream: Send {
    /// Frames per second the device delivers
    fn frame_rate(&self) -> u32;

    /// Next frame, or `None` once the stream has ended
    fn next_frame(&mut self) -> Option<VideoFrame>;
}

/// A camera that can be asked for a stream
pub trait CameraDevice: Send + Sync {
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// Device that loops the still images found in a directory, in file name
/// order. Lets a kiosk run against recorded material.
pub struct ReplayCamera {
    dir: PathBuf,
    fps: u32,
}

impl ReplayCamera {
    pub fn new(dir: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            dir: dir.into(),
            fps,
        }
    }
}

impl CameraDevice for ReplayCamera {
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        if constraints.audio {
            return Err(CameraError::Device("audio capture is not supported".to_string()));
        }
        debug!(
            "Opening replay camera {:?} (user facing: {})",
            self.dir, constraints.user_facing
        );

        let entries = std::fs::read_dir(&self.dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
            _ => CameraError::NotFound(format!("{}: {}", self.dir.display(), e)),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_image_file(p))
            .collect();
        paths.sort();

        let frames: Vec<VideoFrame> = paths
            .iter()
            .filter_map(|p| match load_frame(p) {
                Ok(frame) => Some(frame),
                Err(e) => {
                    warn!("Skipping unreadable camera frame {:?}: {}", p, e);
                    None
                }
            })
            .collect();

        if frames.is_empty() {
            return Err(CameraError::NotFound(format!(
                "no images in {}",
                self.dir.display()
            )));
        }

        info!("Replay camera loaded {} frames from {:?}", frames.len(), self.dir);
        Ok(Box::new(ReplayStream {
            frames,
            index: 0,
            fps: self.fps,
        }))
    }
}

struct ReplayStream {
    frames: Vec<VideoFrame>,
    index: usize,
    fps: u32,
}

impl VideoStream for ReplayStream {
    fn frame_rate(&self) -> u32 {
        self.fps
    }

    fn next_frame(&mut self) -> Option<VideoFrame> {
        let source = self.frames.get(self.index % self.frames.len().max(1))?;
        self.index = self.index.wrapping_add(1);
        Some(VideoFrame::from_rgba(
            source.width,
            source.height,
            source.rgba.clone(),
        ))
    }
}

/// Device that shows the same picture forever
pub struct StillCamera {
    frame: VideoFrame,
    fps: u32,
}

impl StillCamera {
    pub fn new(frame: VideoFrame, fps: u32) -> Self {
        Self { frame, fps }
    }

    pub fn from_path(path: &Path, fps: u32) -> Result<Self, CameraError> {
        let frame = load_frame(path)
            .map_err(|e| CameraError::NotFound(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(frame, fps))
    }
}

impl CameraDevice for StillCamera {
    fn open(&self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        if constraints.audio {
            return Err(CameraError::Device("audio capture is not supported".to_string()));
        }
        Ok(Box::new(ReplayStream {
            frames: vec![self.frame.clone()],
            index: 0,
            fps: self.fps,
        }))
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

fn load_frame(path: &Path) -> Result<VideoFrame, image::ImageError> {
    let img = image::open(path)?.to_rgba8();
    let (width, height) = img.dimensions();
    Ok(VideoFrame::from_rgba(width, height, img.into_raw()))
}

/// Owns the camera stream for one page (kiosk or admin)
pub struct CameraAcquirer {
    device: Arc<dyn CameraDevice>,
    video: Arc<SharedFrame>,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl CameraAcquirer {
    pub fn new(device: Arc<dyn CameraDevice>) -> Self {
        Self {
            device,
            video: Arc::new(SharedFrame::new()),
            pump: Mutex::new(None),
        }
    }

    /// The live video the stream is bound to
    pub fn video(&self) -> &Arc<SharedFrame> {
        &self.video
    }

    /// Whether a stream is currently bound
    pub fn is_active(&self) -> bool {
        self.pump
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }

    /// Request a user-facing, video-only stream and bind it as the live
    /// source. On failure the error is shown on `presenter` and the video
    /// stays unbound. Must be called from within a tokio runtime.
    pub fn init_camera(&self, presenter: &dyn StatusPresenter) -> Result<(), CameraError> {
        let constraints = StreamConstraints::front_video_only();
        match self.device.open(&constraints) {
            Ok(stream) => {
                self.bind(stream);
                Ok(())
            }
            Err(e) => {
                error!("Camera access failed: {}", e);
                presenter.set_status(CAMERA_ERROR_STATUS, StatusKind::Error);
                Err(e)
            }
        }
    }

    fn bind(&self, mut stream: Box<dyn VideoStream>) {
        let fps = stream.frame_rate().max(1);
        info!("Camera stream opened ({} fps)", fps);

        let video = Arc::clone(&self.video);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs_f64(1.0 / fps as f64));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match stream.next_frame() {
                    Some(frame) => video.write(frame),
                    None => {
                        info!("Camera stream ended");
                        break;
                    }
                }
            }
        });

        if let Some(previous) = self.pump.lock().replace(task) {
            previous.abort();
        }
    }

    /// Release the stream and unbind the video
    pub fn stop(&self) {
        if let Some(task) = self.pump.lock().take() {
            task.abort();
            info!("Camera stream released");
        }
        self.video.clear();
    }
}

impl Drop for CameraAcquirer {
    fn drop(&mut self) {
        self.stop();
    }
}
