//! Kiosk Verify - Face Verification Kiosk
//!
//! Scans a subject's QR code, records a short burst of face frames and asks
//! the verification backend whether the face matches and is live.

mod admin;
mod api;
mod app;
mod gui;
mod media;
mod scanner;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use admin::AdminWidget;
use api::VerifyApiClient;
use app::{Kiosk, Settings, ShutdownController, UiAction};
use gui::{
    parse_admin_command, parse_kiosk_command, run_status_renderer, StatusBoard, StatusKind,
    StatusPresenter,
};
use media::{CameraDevice, ReplayCamera, StillCamera};

#[derive(Parser)]
#[command(name = "kiosk-verify", version, about = "Face verification kiosk")]
struct Cli {
    /// Settings file (defaults to the per-user config directory)
    #[arg(long, env = "KIOSK_CONFIG")]
    config: Option<PathBuf>,

    /// Verification backend base URL
    #[arg(long, env = "KIOSK_ENDPOINT")]
    endpoint: Option<String>,

    /// Camera source: a directory of frames or a single image
    #[arg(long, env = "KIOSK_CAMERA")]
    camera: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy, Default)]
enum Command {
    /// Run the verification page
    #[default]
    Kiosk,
    /// Run the face registration snapshot page
    Admin,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Kiosk Verify v{}", env!("CARGO_PKG_VERSION"));
    info!("Platform: {}", std::env::consts::OS);

    let cli = Cli::parse();
    let settings = load_settings(&cli)?;

    // Create tokio runtime for async operations
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match cli.command.unwrap_or_default() {
        Command::Kiosk => runtime.block_on(run_kiosk(settings)),
        Command::Admin => runtime.block_on(run_admin(settings)),
    }
}

fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::load().unwrap_or_else(|e| {
            warn!("Failed to load settings: {}, using defaults", e);
            Settings::default()
        }),
    };

    if let Some(endpoint) = &cli.endpoint {
        settings.endpoint = endpoint.clone();
    }
    if let Some(camera) = &cli.camera {
        settings.camera_dir = Some(camera.clone());
    }
    info!(
        "Endpoint {} ({:?}, {:?})",
        settings.endpoint, settings.variant, settings.direction
    );
    Ok(settings)
}

fn camera_device(settings: &Settings) -> Result<Arc<dyn CameraDevice>> {
    let source = settings
        .camera_dir
        .clone()
        .context("no camera source configured (use --camera or camera_dir)")?;

    if source.is_file() {
        Ok(Arc::new(StillCamera::from_path(&source, settings.camera_fps)?))
    } else {
        Ok(Arc::new(ReplayCamera::new(source, settings.camera_fps)))
    }
}

/// Spawn the signal listener for this run
fn install_shutdown() -> Arc<ShutdownController> {
    let shutdown = Arc::new(ShutdownController::new());
    let listener = Arc::clone(&shutdown);
    tokio::spawn(async move { listener.wait_for_signal().await });
    shutdown
}

async fn run_kiosk(settings: Settings) -> Result<()> {
    let board = Arc::new(StatusBoard::new());
    let renderer = tokio::spawn(run_status_renderer(board.subscribe()));
    let shutdown = install_shutdown();

    let client = VerifyApiClient::with_timeout(&settings.endpoint, settings.request_timeout())?;
    let device = camera_device(&settings)?;
    let kiosk = Kiosk::new(
        settings,
        client,
        device,
        scanner::default_decoder(),
        board.clone(),
    );

    tokio::select! {
        result = kiosk.start() => {
            if let Err(e) = result {
                error!("Kiosk start failed: {}", e);
            }
        }
        _ = shutdown.triggered() => {}
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !shutdown.is_triggered() {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_kiosk_command(&line) {
                    Some(UiAction::Quit) => break,
                    Some(action) => kiosk.handle_action(action),
                    None => warn!("Unknown command: {}", line.trim()),
                }
            }
            _ = shutdown.triggered() => break,
        }
    }

    kiosk.shutdown();
    renderer.abort();
    Ok(())
}

async fn run_admin(settings: Settings) -> Result<()> {
    let board = Arc::new(StatusBoard::new());
    let renderer = tokio::spawn(run_status_renderer(board.subscribe()));
    let shutdown = install_shutdown();

    let widget = AdminWidget::new(camera_device(&settings)?, board.clone(), settings.jpeg_quality());
    board.set_status(
        "Type 'start' to open the camera, 'snap' to take a snapshot.",
        StatusKind::None,
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !shutdown.is_triggered() {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let Some(action) = parse_admin_command(&line) else {
                    warn!("Unknown command: {}", line.trim());
                    continue;
                };
                let quit = action == admin::AdminAction::Quit;
                if let Err(e) = widget.handle_action(action) {
                    error!("Admin action failed: {}", e);
                    board.set_status(&e.to_string(), StatusKind::Error);
                }
                if quit {
                    break;
                }
            }
            _ = shutdown.triggered() => break,
        }
    }

    widget.unload();
    renderer.abort();
    Ok(())
}
