//! Application Configuration
//!
//! Persistent settings for the verification kiosk.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::{Direction, DEFAULT_ENDPOINT};
use crate::media::capture::FALLBACK_RESOLUTION;
use crate::scanner::DEFAULT_SCAN_INTERVAL;

/// Which verification page the kiosk runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Scanner, auto-reset and manual entry
    #[default]
    Full,
    /// Manual entry only, no scanner and no auto-reset
    Simplified,
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // === Backend ===
    /// Base URL of the verification backend
    pub endpoint: String,

    /// Request timeout in seconds (None = wait indefinitely)
    pub request_timeout_secs: Option<u64>,

    /// Entry or exit kiosk
    pub direction: Direction,

    // === Page ===
    pub variant: Variant,

    /// Delay between QR decode attempts
    pub scan_interval_ms: u64,

    /// Pause before the page resets for the next subject
    pub reset_delay_ms: u64,

    // === Capture ===
    /// Length of the face-frame burst
    pub capture_duration_ms: u64,

    /// Frames per second of the burst
    pub capture_fps: u32,

    /// JPEG quality (1-100)
    pub jpeg_quality: u8,

    /// Canvas size used when the stream reports no dimensions (e.g., "640x480")
    pub fallback_resolution: String,

    // === Camera ===
    /// Directory of frames (or a single image) replayed as the camera
    pub camera_dir: Option<PathBuf>,

    /// Rate the camera delivers frames at
    pub camera_fps: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            request_timeout_secs: None,
            direction: Direction::In,

            variant: Variant::Full,
            scan_interval_ms: DEFAULT_SCAN_INTERVAL.as_millis() as u64,
            reset_delay_ms: 3000,

            capture_duration_ms: 2500,
            capture_fps: 8,
            jpeg_quality: 92,
            fallback_resolution: format!("{}x{}", FALLBACK_RESOLUTION.0, FALLBACK_RESOLUTION.1),

            camera_dir: None,
            camera_fps: 15,
        }
    }
}

impl Settings {
    /// Get settings file path
    pub fn file_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("kiosk-verify").join("settings.json"))
    }

    /// Load settings from disk. On first run the defaults are written out
    /// so the operator has a file to edit.
    pub fn load() -> Result<Self> {
        let path = Self::file_path().ok_or_else(|| anyhow::anyhow!("No config directory"))?;
        Self::load_or_init(&path)
    }

    fn load_or_init(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load_from(path);
        }
        let settings = Self::default();
        settings.save_to(path)?;
        log::info!("Wrote default settings to {}", path.display());
        Ok(settings)
    }

    /// Load settings from a specific file, defaults if it does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let settings: Settings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get fallback resolution as (width, height)
    pub fn fallback_tuple(&self) -> (u32, u32) {
        parse_resolution(&self.fallback_resolution)
    }

    /// Never shorter than 1 ms
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(1))
    }

    pub fn reset_delay(&self) -> Duration {
        Duration::from_millis(self.reset_delay_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Clamp JPEG quality into the encoder's range
    pub fn jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }
}

/// Parse resolution string (e.g., "640x480") into (width, height)
pub fn parse_resolution(res: &str) -> (u32, u32) {
    let parts: Vec<&str> = res.trim().split('x').collect();
    if parts.len() == 2 {
        let width = parts[0].trim().parse().unwrap_or(FALLBACK_RESOLUTION.0);
        let height = parts[1].trim().parse().unwrap_or(FALLBACK_RESOLUTION.1);
        (width, height)
    } else {
        FALLBACK_RESOLUTION
    }
}
