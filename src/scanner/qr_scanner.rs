//! QR Code Scanner
//!
//! Polls the live video for a QR code until one is found. On detection the
//! code is stored in the session, polling stops and the verify action is
//! unlocked.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use super::decoder::QrDecoder;
use crate::app::{SessionState, SharedFrame};
use crate::gui::{StatusKind, StatusPresenter};

/// Poll interval of the scan loop
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_millis(500);

pub const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(1);

pub const DECODER_MISSING_STATUS: &str =
    "QR decoder is not available. Check the installation and network, then restart the kiosk.";

#[derive(Debug, Error)]
pub enum ScannerError {
    #[error("no QR decoder available")]
    DecoderUnavailable,
}

/// Scanner lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScannerState {
    #[default]
    Idle,
    Scanning,
    Stopped,
}

/// Result of one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Video has no usable frame yet, or the scanner is not scanning
    NotReady,
    NoCode,
    DecodeFailed,
    Detected(String),
}

struct ScanInner {
    state: ScannerState,
    task: Option<JoinHandle<()>>,
    /// Polls since the last start
    ticks: u64,
}

/// QR code scanner for the live video
pub struct QrScanner {
    decoder: Option<Arc<dyn QrDecoder>>,
    video: Arc<SharedFrame>,
    session: Arc<Mutex<SessionState>>,
    presenter: Arc<dyn StatusPresenter>,
    interval: Duration,
    inner: Mutex<ScanInner>,
}

impl QrScanner {
    /// `interval` is raised to 1 ms if shorter
    pub fn new(
        decoder: Option<Arc<dyn QrDecoder>>,
        video: Arc<SharedFrame>,
        session: Arc<Mutex<SessionState>>,
        presenter: Arc<dyn StatusPresenter>,
        interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            decoder,
            video,
            session,
            presenter,
            interval: interval.max(MIN_SCAN_INTERVAL),
            inner: Mutex::new(ScanInner {
                state: ScannerState::Idle,
                task: None,
                ticks: 0,
            }),
        })
    }

    pub fn state(&self) -> ScannerState {
        self.inner.lock().state
    }

    /// Start polling. Returns `Ok(false)` when a scan loop is already
    /// running. Without a decoder this is a user-visible fatal error and no
    /// loop is started.
    pub fn start(self: &Arc<Self>) -> Result<bool, ScannerError> {
        let Some(decoder) = self.decoder.clone() else {
            error!("QR decoder not available, scanning disabled");
            self.presenter
                .set_status(DECODER_MISSING_STATUS, StatusKind::Error);
            return Err(ScannerError::DecoderUnavailable);
        };

        let mut inner = self.inner.lock();
        if inner.state == ScannerState::Scanning {
            debug!("QR scanner already running");
            return Ok(false);
        }
        inner.state = ScannerState::Scanning;
        inner.ticks = 0;
        self.session.lock().scanning = true;

        inner.task = Some(tokio::spawn(Arc::clone(self).run(decoder)));
        info!("QR scanner started");
        Ok(true)
    }

    async fn run(self: Arc<Self>, decoder: Arc<dyn QrDecoder>) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        loop {
            ticker.tick().await;

            // Decoding is CPU-bound, keep it off the async workers
            let scanner = Arc::clone(&self);
            let decoder = Arc::clone(&decoder);
            let outcome =
                match tokio::task::spawn_blocking(move || scanner.tick(decoder.as_ref())).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("QR decode task failed: {}", e);
                        self.stop();
                        break;
                    }
                };

            match outcome {
                TickOutcome::Detected(_) => break,
                TickOutcome::NotReady if self.state() != ScannerState::Scanning => break,
                _ => {}
            }
        }
    }

    /// One poll of the live video
    pub fn tick(&self, decoder: &dyn QrDecoder) -> TickOutcome {
        {
            let mut inner = self.inner.lock();
            if inner.state != ScannerState::Scanning {
                return TickOutcome::NotReady;
            }
            inner.ticks += 1;
        }

        let Some(frame) = self.video.latest().filter(|f| f.has_dimensions()) else {
            return TickOutcome::NotReady;
        };

        match decoder.decode(&frame.rgba, frame.width, frame.height) {
            Ok(Some(text)) => {
                let code = text.trim();
                if code.is_empty() {
                    return TickOutcome::NoCode;
                }
                let code = code.to_string();
                if self.finish(&code) {
                    TickOutcome::Detected(code)
                } else {
                    TickOutcome::NotReady
                }
            }
            Ok(None) => TickOutcome::NoCode,
            Err(e) => {
                warn!("QR decode error (frame {}): {}", frame.frame_id, e);
                TickOutcome::DecodeFailed
            }
        }
    }

    /// Record a detection. Returns false, touching nothing, when the
    /// scanner was stopped while the frame was being decoded.
    fn finish(&self, code: &str) -> bool {
        {
            let mut inner = self.inner.lock();
            if inner.state != ScannerState::Scanning {
                debug!("Scanner stopped during decode, dropping {}", code);
                return false;
            }
            inner.state = ScannerState::Stopped;
            // The loop exits on its own after this tick
            inner.task = None;
            info!("QR code detected after {} polls: {}", inner.ticks, code);

            let mut session = self.session.lock();
            session.qr_code = Some(code.to_string());
            session.qr_input = code.to_string();
            session.scanning = false;
            session.action_enabled = true;
        }
        self.presenter.set_status(
            &format!("QR code detected: {}. Look at the camera and press Verify.", code),
            StatusKind::Success,
        );
        true
    }

    /// Stop polling
    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        if let Some(task) = inner.task.take() {
            task.abort();
        }
        if inner.state == ScannerState::Scanning {
            inner.state = ScannerState::Stopped;
            info!("QR scanner stopped");
        }
        self.session.lock().scanning = false;
    }
}
