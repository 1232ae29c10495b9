//! Google Gemini backend over the `generateContent` REST endpoint.
//!
//! Text replies use the configured text model with thinking disabled to keep
//! latency down. Images are requested from the image model with the `IMAGE`
//! response modality and come back base64-encoded as `inlineData` parts.

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use super::{BackendError, GeneratedImage, GenerationBackend};
use crate::config::GeminiConfig;

/// Longest slice of an error body kept in [`BackendError::Status`].
const MAX_ERROR_BODY: usize = 2048;

#[derive(Debug, Clone)]
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiBackend {
    pub fn new(cfg: &GeminiConfig) -> Result<Self, BackendError> {
        let api_key = cfg
            .api_key
            .clone()
            .ok_or_else(|| BackendError::NotConfigured("GEMINI_API_KEY is not set".into()))?;
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            api_key,
            base_url: cfg.base_url.trim_end_matches('/').to_owned(),
            text_model: cfg.text_model.clone(),
            image_model: cfg.image_model.clone(),
        })
    }

    async fn generate_content(&self, model: &str, body: Value) -> Result<GenerateContentResponse, BackendError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, model);
        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let mut body = text;
            if body.len() > MAX_ERROR_BODY {
                let mut cut = MAX_ERROR_BODY;
                while !body.is_char_boundary(cut) {
                    cut -= 1;
                }
                body.truncate(cut);
            }
            return Err(BackendError::Status { status: status.as_u16(), body });
        }

        serde_json::from_str(&text).map_err(|e| BackendError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    async fn generate_text(&self, context: &str) -> Result<String, BackendError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": context }] }],
            "generationConfig": { "thinkingConfig": { "thinkingBudget": 0 } },
        });
        let response = self.generate_content(&self.text_model, body).await?;
        let text = response.text();
        debug!(model = %self.text_model, output_len = text.len(), "gemini text generated");
        Ok(text)
    }

    async fn generate_image(&self, prompt: &str) -> Result<GeneratedImage, BackendError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            "generationConfig": { "responseModalities": ["TEXT", "IMAGE"] },
        });
        let response = self.generate_content(&self.image_model, body).await?;
        let inline = response.first_inline_data().ok_or(BackendError::NoImage)?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| BackendError::Malformed(format!("image payload is not base64: {e}")))?;
        if data.is_empty() {
            return Err(BackendError::NoImage);
        }
        debug!(model = %self.image_model, image_bytes = data.len(), "gemini image generated");
        Ok(GeneratedImage {
            data,
            content_type: inline.mime_type.clone().unwrap_or_else(|| "image/png".to_owned()),
        })
    }
}

// ── Response shape ────────────────────────────────────────────────────────────
// Every level is optional: blocked prompts omit `candidates`, and a candidate
// cut off by safety filters may omit `content`.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Default, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Default, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    #[serde(default)]
    mime_type: Option<String>,
    data: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &Part> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> String {
        self.parts().filter_map(|p| p.text.as_deref()).collect()
    }

    fn first_inline_data(&self) -> Option<&InlineData> {
        self.parts().find_map(|p| p.inline_data.as_ref())
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
