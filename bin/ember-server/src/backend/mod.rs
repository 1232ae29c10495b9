//! Generation backend adapter.
//!
//! [`GenerationBackend`] is the only seam between the completion orchestrator
//! and the model provider. Both operations may suspend for several seconds.
//! Every failure is reported as a [`BackendError`]; nothing here retries.

#[cfg(test)]
pub mod fake;
pub mod gemini;

use async_trait::async_trait;
use thiserror::Error;

pub use gemini::GeminiBackend;

/// Why a generation call failed.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced an HTTP response (DNS, TLS, reset, …).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status (auth, quota, 5xx).
    #[error("backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body did not have the expected shape.
    #[error("malformed backend response: {0}")]
    Malformed(String),

    /// An image was requested but the response carried none.
    #[error("backend response contained no image")]
    NoImage,

    /// The backend cannot be used with the current configuration.
    #[error("backend not configured: {0}")]
    NotConfigured(String),
}

/// Encoded image bytes returned by [`GenerationBackend::generate_image`].
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Text and image generation capabilities.
#[async_trait]
pub trait GenerationBackend: Send + Sync + 'static {
    /// Produce a reply to the rendered conversation context.
    ///
    /// A response that carries no text yields `Ok("")`.
    async fn generate_text(&self, context: &str) -> Result<String, BackendError>;

    /// Produce an image for `prompt`.
    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, BackendError>;
}
