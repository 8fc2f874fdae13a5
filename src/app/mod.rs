//! Application State Management
//!
//! The verification kiosk: camera, QR scanner, frame capture and the
//! verify cycle that ties them to the backend.

pub mod config;
pub mod shutdown;
pub mod types;

pub use config::{Settings, Variant};
pub use shutdown::ShutdownController;
pub use types::{OrchestratorState, SessionState, SharedFrame, UiAction};

use log::{error, info, warn};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::api::{ApiError, VerifyEndpoint, VerifyRequest, VerifyResponse};
use crate::gui::{StatusKind, StatusPresenter};
use crate::media::{CameraAcquirer, CameraDevice, CameraError, CancelToken, CaptureError, FrameCapturer};
use crate::scanner::{QrDecoder, QrScanner, ScannerError};

pub const INITIAL_STATUS: &str = "Show your QR code to the camera or type it in, then press Verify.";
pub const MANUAL_ENTRY_STATUS: &str = "Enter your QR code and press Verify.";
pub const RECORDING_STATUS: &str = "Recording... look at the camera and blink naturally.";
pub const ANALYZING_STATUS: &str = "Analyzing...";
pub const MISSING_QR_STATUS: &str = "Scan or enter a QR code first.";
pub const CONNECTION_ERROR_STATUS: &str = "Could not reach the verification server. Try again.";
pub const CAPTURE_ERROR_STATUS: &str = "Could not record from the camera. Try again.";

#[derive(Debug, Error)]
pub enum KioskError {
    #[error("no QR code scanned or entered")]
    MissingQr,
    #[error("a verification is already in progress")]
    Busy,
    #[error("kiosk is shut down")]
    ShutDown,
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Scanner(#[from] ScannerError),
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("verification request failed: {0}")]
    Api(#[from] ApiError),
}

struct KioskInner<E> {
    settings: Settings,
    endpoint: E,
    presenter: Arc<dyn StatusPresenter>,
    camera: CameraAcquirer,
    /// Absent in the simplified variant
    scanner: Option<Arc<QrScanner>>,
    capturer: FrameCapturer,
    session: Arc<Mutex<SessionState>>,
    state: Mutex<OrchestratorState>,
    cancel: CancelToken,
    reset_task: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// Verification kiosk page
pub struct Kiosk<E: VerifyEndpoint> {
    inner: Arc<KioskInner<E>>,
}

impl<E: VerifyEndpoint> Clone for Kiosk<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: VerifyEndpoint> Kiosk<E> {
    pub fn new(
        settings: Settings,
        endpoint: E,
        device: Arc<dyn CameraDevice>,
        decoder: Option<Arc<dyn QrDecoder>>,
        presenter: Arc<dyn StatusPresenter>,
    ) -> Self {
        let camera = CameraAcquirer::new(device);
        let video = Arc::clone(camera.video());
        let session = Arc::new(Mutex::new(SessionState::default()));

        let scanner = match settings.variant {
            Variant::Full => Some(QrScanner::new(
                decoder,
                Arc::clone(&video),
                Arc::clone(&session),
                Arc::clone(&presenter),
                settings.scan_interval(),
            )),
            Variant::Simplified => None,
        };

        let (fallback_w, fallback_h) = settings.fallback_tuple();
        let capturer = FrameCapturer::new(video, settings.jpeg_quality())
            .with_fallback(fallback_w, fallback_h);

        Self {
            inner: Arc::new(KioskInner {
                settings,
                endpoint,
                presenter,
                camera,
                scanner,
                capturer,
                session,
                state: Mutex::new(OrchestratorState::Ready),
                cancel: CancelToken::new(),
                reset_task: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        *self.inner.state.lock()
    }

    /// Page load: show the instructions, open the camera and, in the full
    /// variant, start scanning once the first frame is in.
    pub async fn start(&self) -> Result<(), KioskError> {
        let inner = &self.inner;
        let instructions = match inner.settings.variant {
            Variant::Full => INITIAL_STATUS,
            Variant::Simplified => MANUAL_ENTRY_STATUS,
        };
        inner.presenter.set_status(instructions, StatusKind::None);

        inner.camera.init_camera(inner.presenter.as_ref())?;
        inner.camera.video().wait_for_frame().await;
        info!("Camera ready");

        match &inner.scanner {
            Some(scanner) => {
                scanner.start()?;
            }
            None => inner.session.lock().action_enabled = true,
        }
        Ok(())
    }

    /// Type into the manual QR field
    pub fn set_manual_code(&self, code: &str) {
        let ready = self.state() == OrchestratorState::Ready;
        let mut session = self.inner.session.lock();
        session.qr_input = code.to_string();
        if ready {
            session.action_enabled = session.effective_qr().is_some()
                || self.inner.settings.variant == Variant::Simplified;
        }
    }

    pub fn handle_action(&self, action: UiAction) {
        match action {
            UiAction::Verify => {
                let kiosk = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = kiosk.verify().await {
                        warn!("Verification cycle ended early: {}", e);
                    }
                });
            }
            UiAction::EnterCode(code) => self.set_manual_code(&code),
            UiAction::Quit => self.shutdown(),
        }
    }

    /// Run one verification cycle: record the burst, submit it with the QR
    /// code and show the verdict.
    pub async fn verify(&self) -> Result<VerifyResponse, KioskError> {
        let inner = &self.inner;
        if inner.shut_down.load(Ordering::Acquire) {
            return Err(KioskError::ShutDown);
        }

        let qr_code = {
            let mut state = inner.state.lock();
            if *state != OrchestratorState::Ready {
                info!("Verify ignored, cycle in progress ({:?})", *state);
                return Err(KioskError::Busy);
            }
            let mut session = inner.session.lock();
            let Some(qr_code) = session.effective_qr() else {
                drop(session);
                drop(state);
                inner
                    .presenter
                    .set_status(MISSING_QR_STATUS, StatusKind::Error);
                return Err(KioskError::MissingQr);
            };
            session.action_enabled = false;
            *state = OrchestratorState::Capturing;
            qr_code
        };

        info!("Verification started for {}", qr_code);
        inner.presenter.set_status(RECORDING_STATUS, StatusKind::None);

        let settings = &inner.settings;
        let frames = match inner
            .capturer
            .capture_frames(settings.capture_duration_ms, settings.capture_fps, &inner.cancel)
            .await
        {
            Ok(frames) => frames,
            Err(e) => {
                error!("Frame capture failed: {}", e);
                if !matches!(e, CaptureError::Cancelled) {
                    inner
                        .presenter
                        .set_status(CAPTURE_ERROR_STATUS, StatusKind::Error);
                }
                self.back_to_ready();
                return Err(e.into());
            }
        };

        self.set_state(OrchestratorState::Submitting);
        inner.presenter.set_status(ANALYZING_STATUS, StatusKind::None);

        let request = VerifyRequest::new(qr_code, frames, settings.direction);
        match inner.endpoint.verify(&request).await {
            Ok(response) => {
                let (kind, text) = response.presentation();
                inner.presenter.set_status(&text, kind);
                self.set_state(OrchestratorState::DisplayingResult);
                self.finish_cycle();
                Ok(response)
            }
            Err(e) => {
                error!("Verification request failed: {}", e);
                inner
                    .presenter
                    .set_status(CONNECTION_ERROR_STATUS, StatusKind::Error);
                self.back_to_ready();
                Err(e.into())
            }
        }
    }

    fn set_state(&self, state: OrchestratorState) {
        *self.inner.state.lock() = state;
    }

    /// Failed cycle: keep the subject, unlock the action straight away
    fn back_to_ready(&self) {
        self.set_state(OrchestratorState::Ready);
        self.inner.session.lock().action_enabled = true;
    }

    fn finish_cycle(&self) {
        let inner = &self.inner;
        if inner.shut_down.load(Ordering::Acquire) {
            return;
        }

        match inner.settings.variant {
            Variant::Simplified => self.back_to_ready(),
            Variant::Full => {
                let delay = inner.settings.reset_delay();
                let kiosk = self.clone();
                let task = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    kiosk.reset_for_next_subject();
                });
                if let Some(previous) = inner.reset_task.lock().replace(task) {
                    previous.abort();
                }
            }
        }
    }

    /// Clear the subject, restore the instructions and resume scanning
    pub fn reset_for_next_subject(&self) {
        let inner = &self.inner;
        if inner.shut_down.load(Ordering::Acquire) {
            return;
        }
        info!("Resetting for the next subject");

        inner.session.lock().reset();
        inner.presenter.set_status(INITIAL_STATUS, StatusKind::None);
        self.set_state(OrchestratorState::Ready);

        if let Some(scanner) = &inner.scanner {
            if let Err(e) = scanner.start() {
                error!("Could not resume scanning: {}", e);
            }
        }
    }

    /// Leave the page: cancel any capture and pending reset, stop the
    /// scanner and release the camera
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Kiosk shutting down");

        inner.cancel.cancel();
        if let Some(task) = inner.reset_task.lock().take() {
            task.abort();
        }
        if let Some(scanner) = &inner.scanner {
            scanner.stop();
        }
        let frames = inner.camera.video().frame_count();
        inner.camera.stop();
        info!("Camera released after {} frames", frames);
    }
}

#[cfg(test)]
impl<E: VerifyEndpoint> Kiosk<E> {
    pub fn endpoint(&self) -> &E {
        &self.inner.endpoint
    }

    /// Snapshot of the subject state
    pub fn session(&self) -> SessionState {
        self.inner.session.lock().clone()
    }

    pub fn scanner(&self) -> Option<&Arc<QrScanner>> {
        self.inner.scanner.as_ref()
    }

    pub fn camera(&self) -> &CameraAcquirer {
        &self.inner.camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{VerifyStatus, GENERIC_ERROR_MESSAGE, SUCCESS_MESSAGE};
    use crate::gui::StatusBoard;
    use crate::media::{StillCamera, VideoFrame};
    use crate::scanner::decoder::DecodeError;
    use crate::scanner::qr_scanner::ScannerState;
    use std::time::Duration;
    use tokio::time::sleep;

    /// Reports `code` once it has been shown
    #[derive(Default)]
    struct HeldUpCode {
        code: Mutex<Option<String>>,
    }

    impl HeldUpCode {
        fn show(&self, code: &str) {
            *self.code.lock() = Some(code.to_string());
        }

        fn hide(&self) {
            *self.code.lock() = None;
        }
    }

    impl QrDecoder for HeldUpCode {
        fn decode(&self, _: &[u8], _: u32, _: u32) -> Result<Option<String>, DecodeError> {
            Ok(self.code.lock().clone())
        }
    }

    struct FakeEndpoint {
        reply: Mutex<Option<String>>,
        latency: Duration,
        requests: Mutex<Vec<VerifyRequest>>,
    }

    impl FakeEndpoint {
        /// `None` fails every request
        fn replying(body: Option<&str>) -> Self {
            Self {
                reply: Mutex::new(body.map(str::to_string)),
                latency: Duration::from_millis(200),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    impl VerifyEndpoint for FakeEndpoint {
        async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, ApiError> {
            sleep(self.latency).await;
            self.requests.lock().push(request.clone());
            let reply = self.reply.lock().clone();
            let body = reply.as_deref().unwrap_or("<html>502</html>");
            serde_json::from_str(body).map_err(|source| ApiError::Decode {
                status: 502,
                source,
            })
        }
    }

    struct Fixture {
        kiosk: Kiosk<FakeEndpoint>,
        board: Arc<StatusBoard>,
        code: Arc<HeldUpCode>,
    }

    fn fixture(variant: Variant, body: Option<&str>) -> Fixture {
        let settings = Settings {
            variant,
            ..Default::default()
        };
        let board = Arc::new(StatusBoard::new());
        let code = Arc::new(HeldUpCode::default());
        let camera = Arc::new(StillCamera::new(VideoFrame::empty(16, 12), 10));
        let kiosk = Kiosk::new(
            settings,
            FakeEndpoint::replying(body),
            camera,
            Some(code.clone()),
            board.clone(),
        );
        Fixture { kiosk, board, code }
    }

    #[tokio::test(start_paused = true)]
    async fn missing_qr_reports_error_without_calling_backend() {
        let f = fixture(Variant::Full, Some(r#"{"status":"success"}"#));
        f.kiosk.start().await.unwrap();

        let err = f.kiosk.verify().await.unwrap_err();
        assert!(matches!(err, KioskError::MissingQr));
        assert_eq!(f.board.current().text, MISSING_QR_STATUS);
        assert_eq!(f.board.current().kind, StatusKind::Error);
        assert_eq!(f.kiosk.endpoint().calls(), 0);
        assert_eq!(f.kiosk.state(), OrchestratorState::Ready);

        f.kiosk.set_manual_code("   ");
        assert!(matches!(f.kiosk.verify().await, Err(KioskError::MissingQr)));
        f.kiosk.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn full_cycle_resets_after_delay_and_resumes_scanning() {
        let f = fixture(Variant::Full, Some(r#"{"status":"success"}"#));
        f.kiosk.start().await.unwrap();
        assert_eq!(f.board.current().text, INITIAL_STATUS);

        f.code.show(" EMP:0042 ");
        sleep(Duration::from_millis(600)).await;
        f.code.hide();
        let session = f.kiosk.session();
        assert_eq!(session.qr_code.as_deref(), Some("EMP:0042"));
        assert!(session.action_enabled);

        let response = f.kiosk.verify().await.unwrap();
        assert_eq!(response.status, VerifyStatus::Success);
        assert_eq!(f.board.current().text, SUCCESS_MESSAGE);
        assert_eq!(f.board.current().kind, StatusKind::Success);
        assert_eq!(f.kiosk.state(), OrchestratorState::DisplayingResult);
        assert!(!f.kiosk.session().action_enabled);

        {
            let requests = f.kiosk.endpoint().requests.lock();
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].qr_code(), "EMP:0042");
            assert_eq!(requests[0].frames().len(), 20);
        }

        sleep(Duration::from_millis(2900)).await;
        assert_eq!(f.kiosk.state(), OrchestratorState::DisplayingResult);

        sleep(Duration::from_millis(200)).await;
        let session = f.kiosk.session();
        assert_eq!(session.qr_code, None);
        assert!(session.qr_input.is_empty());
        assert!(!session.action_enabled);
        assert_eq!(f.kiosk.state(), OrchestratorState::Ready);
        assert_eq!(f.board.current().text, INITIAL_STATUS);
        assert_eq!(
            f.kiosk.scanner().map(|s| s.state()),
            Some(ScannerState::Scanning)
        );
        f.kiosk.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn network_failure_reenables_action_immediately() {
        let f = fixture(Variant::Full, None);
        f.kiosk.start().await.unwrap();
        f.kiosk.set_manual_code("EMP:9");
        assert!(f.kiosk.session().action_enabled);

        let err = f.kiosk.verify().await.unwrap_err();
        assert!(matches!(err, KioskError::Api(_)));
        assert_eq!(f.board.current().text, CONNECTION_ERROR_STATUS);
        assert_eq!(f.board.current().kind, StatusKind::Error);
        assert_eq!(f.kiosk.state(), OrchestratorState::Ready);
        let session = f.kiosk.session();
        assert!(session.action_enabled);
        assert_eq!(session.qr_input, "EMP:9");
        f.kiosk.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn simplified_variant_keeps_input_and_skips_reset() {
        let f = fixture(Variant::Simplified, Some(r#"{"status":"fraud"}"#));
        f.kiosk.start().await.unwrap();
        assert!(f.kiosk.scanner().is_none());
        assert_eq!(f.board.current().text, MANUAL_ENTRY_STATUS);

        f.kiosk.set_manual_code("EMP:1");
        f.kiosk.verify().await.unwrap();
        assert_eq!(f.kiosk.state(), OrchestratorState::Ready);
        let session = f.kiosk.session();
        assert!(session.action_enabled);
        assert_eq!(session.qr_input, "EMP:1");

        sleep(Duration::from_secs(5)).await;
        assert_eq!(f.kiosk.session().qr_input, "EMP:1");
        assert_eq!(f.board.current().kind, StatusKind::Error);
        f.kiosk.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn server_message_and_unknown_tags() {
        let f = fixture(
            Variant::Simplified,
            Some(r#"{"status":"spoofing","message":"X"}"#),
        );
        f.kiosk.start().await.unwrap();
        f.kiosk.set_manual_code("EMP:1");
        f.kiosk.verify().await.unwrap();
        assert_eq!(f.board.current().text, "X");
        assert_eq!(f.board.current().kind, StatusKind::Error);

        *f.kiosk.endpoint().reply.lock() = Some(r#"{"status":"expired"}"#.into());
        f.kiosk.verify().await.unwrap();
        assert_eq!(f.board.current().text, GENERIC_ERROR_MESSAGE);
        assert_eq!(f.board.current().kind, StatusKind::Error);
        f.kiosk.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn reply_without_status_is_shown_as_a_verdict() {
        let f = fixture(Variant::Full, Some(r#"{"message":"Internal failure"}"#));
        f.kiosk.start().await.unwrap();
        f.kiosk.set_manual_code("EMP:3");

        let response = f.kiosk.verify().await.unwrap();
        assert!(matches!(response.status, VerifyStatus::Other(_)));
        assert_eq!(f.board.current().text, "Internal failure");
        assert_eq!(f.board.current().kind, StatusKind::Error);
        assert_eq!(f.kiosk.state(), OrchestratorState::DisplayingResult);
        assert!(!f.kiosk.session().action_enabled);

        sleep(Duration::from_millis(3100)).await;
        assert_eq!(f.kiosk.state(), OrchestratorState::Ready);
        assert!(f.kiosk.session().qr_input.is_empty());
        f.kiosk.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn second_verify_during_cycle_is_busy() {
        let f = fixture(Variant::Full, Some(r#"{"status":"success"}"#));
        f.kiosk.start().await.unwrap();
        f.kiosk.set_manual_code("EMP:5");

        let running = {
            let kiosk = f.kiosk.clone();
            tokio::spawn(async move { kiosk.verify().await })
        };
        sleep(Duration::from_millis(300)).await;
        assert_eq!(f.kiosk.state(), OrchestratorState::Capturing);
        assert_eq!(f.board.current().text, RECORDING_STATUS);
        assert!(matches!(f.kiosk.verify().await, Err(KioskError::Busy)));

        running.await.unwrap().unwrap();
        assert_eq!(f.kiosk.endpoint().calls(), 1);
        f.kiosk.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_cancels_capture_and_releases_camera() {
        let f = fixture(Variant::Full, Some(r#"{"status":"success"}"#));
        f.kiosk.start().await.unwrap();
        f.kiosk.set_manual_code("EMP:5");

        let running = {
            let kiosk = f.kiosk.clone();
            tokio::spawn(async move { kiosk.verify().await })
        };
        sleep(Duration::from_millis(300)).await;
        f.kiosk.shutdown();

        let result = running.await.unwrap();
        assert!(matches!(
            result,
            Err(KioskError::Capture(CaptureError::Cancelled))
        ));
        assert_eq!(f.kiosk.endpoint().calls(), 0);
        assert!(!f.kiosk.camera().is_active());
        assert_eq!(
            f.kiosk.scanner().map(|s| s.state()),
            Some(ScannerState::Stopped)
        );
        assert!(matches!(f.kiosk.verify().await, Err(KioskError::ShutDown)));
    }

    #[tokio::test(start_paused = true)]
    async fn camera_failure_is_terminal() {
        struct NoCamera;
        impl CameraDevice for NoCamera {
            fn open(
                &self,
                _: &crate::media::camera::StreamConstraints,
            ) -> Result<Box<dyn crate::media::camera::VideoStream>, CameraError> {
                Err(CameraError::NotFound("no device".into()))
            }
        }

        let board = Arc::new(StatusBoard::new());
        let kiosk = Kiosk::new(
            Settings::default(),
            FakeEndpoint::replying(None),
            Arc::new(NoCamera),
            None,
            board.clone(),
        );
        assert!(matches!(kiosk.start().await, Err(KioskError::Camera(_))));
        assert_eq!(board.current().kind, StatusKind::Error);
        assert!(!kiosk.camera().is_active());
    }
}
