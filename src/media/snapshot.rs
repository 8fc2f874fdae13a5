//! Snapshot encoding
//!
//! Captured frames travel as data URLs (`data:image/jpeg;base64,...`), both in
//! the verification request and in the admin form's hidden field.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const JPEG_MIME: &str = "image/jpeg";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("no image data")]
    Empty,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// One encoded frame as a data URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(String);

impl Snapshot {
    /// Encode a canvas as a JPEG data URL. Alpha is dropped.
    pub fn encode_jpeg(canvas: &RgbaImage, quality: u8) -> Result<Self, SnapshotError> {
        let rgb = RgbImage::from_fn(canvas.width(), canvas.height(), |x, y| {
            let p = canvas.get_pixel(x, y);
            Rgb([p[0], p[1], p[2]])
        });

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode_image(&rgb)?;

        Ok(Self(format!("data:{};base64,{}", JPEG_MIME, STANDARD.encode(&jpeg))))
    }

    /// Wrap an already encoded data URL
    pub fn from_data_url(data_url: impl Into<String>) -> Self {
        Self(data_url.into())
    }

    pub fn as_data_url(&self) -> &str {
        &self.0
    }

    /// Decode back to `(mime, bytes)`
    pub fn decode(&self) -> Result<(String, Vec<u8>), SnapshotError> {
        decode_data_url(&self.0)
    }
}

/// Decode a data URL or a bare base64 string into `(mime, bytes)`.
/// The mime type falls back to `image/jpeg` when absent or malformed.
pub fn decode_data_url(input: &str) -> Result<(String, Vec<u8>), SnapshotError> {
    if input.is_empty() {
        return Err(SnapshotError::Empty);
    }

    let mut mime = JPEG_MIME.to_string();
    let mut payload = input;

    if input.starts_with("data:") {
        if let Some((header, data)) = input.split_once(',') {
            payload = data;
            // header: data:image/jpeg;base64
            if let Some((_, declared)) = header.split(';').next().and_then(|h| h.split_once(':')) {
                if !declared.is_empty() {
                    mime = declared.to_string();
                }
            }
        }
    }

    Ok((mime, STANDARD.decode(payload.trim())?))
}
