//! Admin Snapshot Widget
//!
//! Lets an operator register a subject's face, either from a live camera
//! snapshot or from an image file.

use log::{info, warn};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::gui::{StatusKind, StatusPresenter};
use crate::media::{CameraAcquirer, CameraDevice, CameraError, Snapshot, SnapshotError};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] SnapshotError),
    #[error("no such image file: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("no snapshot taken")]
    NoSnapshot,
    #[error("failed to write preview: {0}")]
    Io(#[from] std::io::Error),
}

/// Commands of the admin page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    StartCamera,
    CaptureSnapshot,
    ClearSnapshot,
    SelectFile(PathBuf),
    SavePreview(PathBuf),
    Quit,
}

/// What the registration form will submit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminForm {
    /// Hidden field holding the snapshot data URL
    pub face_image_b64: Option<Snapshot>,
    /// File input
    pub face_image: Option<PathBuf>,
}

/// Enabled/visible state of the widget's controls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdminControls {
    pub snapshot_enabled: bool,
    pub clear_enabled: bool,
    /// Snapshot preview shown in place of the live view
    pub preview_visible: bool,
}

#[derive(Default)]
struct AdminState {
    form: AdminForm,
    controls: AdminControls,
}

pub struct AdminWidget {
    camera: CameraAcquirer,
    presenter: Arc<dyn StatusPresenter>,
    jpeg_quality: u8,
    state: Mutex<AdminState>,
}

impl AdminWidget {
    pub fn new(
        device: Arc<dyn CameraDevice>,
        presenter: Arc<dyn StatusPresenter>,
        jpeg_quality: u8,
    ) -> Self {
        Self {
            camera: CameraAcquirer::new(device),
            presenter,
            jpeg_quality,
            state: Mutex::new(AdminState::default()),
        }
    }

    pub fn form(&self) -> AdminForm {
        self.state.lock().form.clone()
    }

    pub fn controls(&self) -> AdminControls {
        self.state.lock().controls
    }

    pub fn camera(&self) -> &CameraAcquirer {
        &self.camera
    }

    /// Acquire the camera. Returns `Ok(false)` if it is already running.
    pub fn start_camera(&self) -> Result<bool, AdminError> {
        if self.camera.is_active() {
            return Ok(false);
        }
        self.camera.init_camera(self.presenter.as_ref())?;
        self.state.lock().controls.snapshot_enabled = true;
        self.presenter
            .set_status("Camera started. Take a snapshot when ready.", StatusKind::None);
        Ok(true)
    }

    /// Freeze the current frame into the form. Returns `Ok(false)` when the
    /// video has no usable frame yet.
    pub fn capture_snapshot(&self) -> Result<bool, AdminError> {
        let video = self.camera.video();
        let (Some((width, height)), Some(frame)) = (video.dimensions(), video.latest()) else {
            warn!("Snapshot requested before the camera delivered a frame");
            return Ok(false);
        };

        let canvas = frame.draw_to_canvas(width, height);
        let snapshot = Snapshot::encode_jpeg(&canvas, self.jpeg_quality)?;
        info!("Snapshot captured ({}x{})", width, height);

        {
            let mut state = self.state.lock();
            state.form.face_image_b64 = Some(snapshot);
            state.form.face_image = None;
            state.controls.preview_visible = true;
            state.controls.clear_enabled = true;
        }
        self.presenter
            .set_status("Snapshot captured.", StatusKind::Success);
        Ok(true)
    }

    /// Drop the snapshot and go back to the live view
    pub fn clear_snapshot(&self) {
        let mut state = self.state.lock();
        state.form.face_image_b64 = None;
        state.controls.preview_visible = false;
        state.controls.clear_enabled = false;
    }

    /// Use an image file instead of the camera
    pub fn select_file(&self, path: &Path) -> Result<(), AdminError> {
        if !path.is_file() {
            return Err(AdminError::FileNotFound(path.to_path_buf()));
        }

        self.clear_snapshot();
        self.camera.stop();
        {
            let mut state = self.state.lock();
            state.form.face_image = Some(path.to_path_buf());
            state.controls.snapshot_enabled = false;
        }
        info!("Face image file selected: {}", path.display());
        self.presenter.set_status(
            &format!("Using file {}", path.display()),
            StatusKind::None,
        );
        Ok(())
    }

    /// Write the snapshot preview to `path` as a JPEG file
    pub fn write_preview(&self, path: &Path) -> Result<(), AdminError> {
        let snapshot = self
            .state
            .lock()
            .form
            .face_image_b64
            .clone()
            .ok_or(AdminError::NoSnapshot)?;
        let (_, bytes) = snapshot.decode()?;
        std::fs::write(path, bytes)?;
        info!("Snapshot preview written to {}", path.display());
        Ok(())
    }

    /// Page unload: release the camera
    pub fn unload(&self) {
        self.camera.stop();
        self.state.lock().controls.snapshot_enabled = false;
    }

    pub fn handle_action(&self, action: AdminAction) -> Result<(), AdminError> {
        match action {
            AdminAction::StartCamera => {
                self.start_camera()?;
            }
            AdminAction::CaptureSnapshot => {
                if !self.capture_snapshot()? {
                    self.presenter
                        .set_status("Camera is not ready yet.", StatusKind::Error);
                }
            }
            AdminAction::ClearSnapshot => self.clear_snapshot(),
            AdminAction::SelectFile(path) => self.select_file(&path)?,
            AdminAction::SavePreview(path) => self.write_preview(&path)?,
            AdminAction::Quit => self.unload(),
        }
        Ok(())
    }
}
