//! QR Scanning
//!
//! Finds the subject's QR code in the live video.

pub mod decoder;
pub mod qr_scanner;

pub use decoder::{default_decoder, QrDecoder};
pub use qr_scanner::{QrScanner, ScannerError, DEFAULT_SCAN_INTERVAL};
