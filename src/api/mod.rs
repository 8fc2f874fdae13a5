//! Verification API Client
//!
//! Submits the QR payload and captured frames to the backend's `/verify`
//! endpoint and interprets its verdict.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::gui::StatusKind;
use crate::media::Snapshot;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5000";

pub const SUCCESS_MESSAGE: &str = "Authorization succeeded.";
pub const SPOOFING_MESSAGE: &str = "Spoofing attempt detected — no natural blink.";
pub const FRAUD_MESSAGE: &str = "Identity does not match the QR code.";
pub const GENERIC_ERROR_MESSAGE: &str = "An error occurred during verification.";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid response (HTTP {status}): {source}")]
    Decode {
        status: u16,
        source: serde_json::Error,
    },
}

/// Whether the subject is entering or leaving
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[default]
    In,
    Out,
}

/// Body of `POST /verify`
#[derive(Debug, Clone, Serialize)]
pub struct VerifyRequest {
    qr_code: String,
    frames: Vec<Snapshot>,
    direction: Direction,
}

impl VerifyRequest {
    pub fn new(qr_code: String, frames: Vec<Snapshot>, direction: Direction) -> Self {
        Self {
            qr_code,
            frames,
            direction,
        }
    }
}

#[cfg(test)]
impl VerifyRequest {
    pub fn qr_code(&self) -> &str {
        &self.qr_code
    }

    pub fn frames(&self) -> &[Snapshot] {
        &self.frames
    }
}

/// Status tag of a verification verdict
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "serde_json::Value")]
pub enum VerifyStatus {
    Success,
    Spoofing,
    Fraud,
    /// Any other tag (`error`, `expired`, ...), including a missing or
    /// non-string one
    Other(String),
}

impl Default for VerifyStatus {
    fn default() -> Self {
        VerifyStatus::Other(String::new())
    }
}

impl From<serde_json::Value> for VerifyStatus {
    fn from(tag: serde_json::Value) -> Self {
        match tag {
            serde_json::Value::String(tag) => match tag.as_str() {
                "success" => VerifyStatus::Success,
                "spoofing" => VerifyStatus::Spoofing,
                "fraud" => VerifyStatus::Fraud,
                _ => VerifyStatus::Other(tag),
            },
            serde_json::Value::Null => VerifyStatus::default(),
            other => VerifyStatus::Other(other.to_string()),
        }
    }
}

impl VerifyStatus {
    pub fn tone(&self) -> StatusKind {
        match self {
            VerifyStatus::Success => StatusKind::Success,
            _ => StatusKind::Error,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            VerifyStatus::Success => SUCCESS_MESSAGE,
            VerifyStatus::Spoofing => SPOOFING_MESSAGE,
            VerifyStatus::Fraud => FRAUD_MESSAGE,
            VerifyStatus::Other(_) => GENERIC_ERROR_MESSAGE,
        }
    }
}

/// Backend verdict
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub status: VerifyStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl VerifyResponse {
    /// Tone and text to show. A non-empty server message replaces the
    /// default text for the tag.
    pub fn presentation(&self) -> (StatusKind, String) {
        let text = self
            .message
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.status.default_message());
        (self.status.tone(), text.to_string())
    }
}

/// Something that can judge a verification request
pub trait VerifyEndpoint: Send + Sync + 'static {
    fn verify(
        &self,
        request: &VerifyRequest,
    ) -> impl Future<Output = Result<VerifyResponse, ApiError>> + Send;
}

/// HTTP client for the verification backend
pub struct VerifyApiClient {
    client: Client,
    base_url: String,
}

impl VerifyApiClient {
    #[cfg(test)]
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Client with an overall request timeout. `None` waits indefinitely.
    pub fn with_timeout(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl VerifyEndpoint for VerifyApiClient {
    async fn verify(&self, request: &VerifyRequest) -> Result<VerifyResponse, ApiError> {
        let url = format!("{}/verify", self.base_url);
        info!(
            "Submitting {} frames for verification to {}",
            request.frames.len(),
            url
        );

        let response = self.client.post(&url).json(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        // The backend answers rejected input with a JSON verdict and a 4xx,
        // so the body is interpreted whatever the HTTP status.
        if !status.is_success() {
            warn!("Verification endpoint returned {}: {}", status, body);
        }

        let verdict: VerifyResponse =
            serde_json::from_str(&body).map_err(|source| ApiError::Decode {
                status: status.as_u16(),
                source,
            })?;
        info!("Verification verdict: {:?}", verdict.status);
        Ok(verdict)
    }
}
