//! QR decoding backend

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("QR decode failed: {0}")]
pub struct DecodeError(pub String);

/// Decodes a QR code out of raw RGBA pixels
pub trait QrDecoder: Send + Sync {
    /// `Ok(None)` when the image holds no readable code
    fn decode(&self, rgba: &[u8], width: u32, height: u32) -> Result<Option<String>, DecodeError>;
}

/// The decoder this build ships with, if any
pub fn default_decoder() -> Option<Arc<dyn QrDecoder>> {
    #[cfg(feature = "qr-scanner")]
    {
        Some(Arc::new(RqrrDecoder))
    }

    #[cfg(not(feature = "qr-scanner"))]
    {
        None
    }
}

/// Decoder built on rqrr
#[cfg(feature = "qr-scanner")]
pub struct RqrrDecoder;

#[cfg(feature = "qr-scanner")]
impl QrDecoder for RqrrDecoder {
    fn decode(&self, rgba: &[u8], width: u32, height: u32) -> Result<Option<String>, DecodeError> {
        let (w, h) = (width as usize, height as usize);
        if rgba.len() < w * h * 4 {
            return Err(DecodeError(format!(
                "pixel buffer too small: {} < {}",
                rgba.len(),
                w * h * 4
            )));
        }

        // BT.601 luma, same weights the YUV path uses
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| {
            let i = (y * w + x) * 4;
            let (r, g, b) = (rgba[i] as u32, rgba[i + 1] as u32, rgba[i + 2] as u32);
            ((r * 77 + g * 150 + b * 29) >> 8) as u8
        });

        let grids = prepared.detect_grids();
        tracing::debug!("Found {} potential QR grids", grids.len());

        for grid in grids {
            match grid.decode() {
                Ok((_, content)) => return Ok(Some(content)),
                Err(e) => tracing::debug!("Grid decode failed: {:?}", e),
            }
        }
        Ok(None)
    }
}
