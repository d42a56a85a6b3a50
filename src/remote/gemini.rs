//! Gemini `generateContent` client used for image description.
//!
//! The image is sent inline (base64) next to the text prompt. Rate-limit
//! responses come back as HTTP 429 and surface as `RESOURCE_EXHAUSTED`
//! errors, which the retry wrapper recognises.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ImagePayload, RemoteError, VisionModel};
use crate::config::VisionConfig;

pub struct GeminiVision {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiVision {
    pub fn new(config: &VisionConfig, api_key: &str) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl VisionModel for GeminiVision {
    async fn generate(
        &self,
        model: &str,
        prompt: &str,
        image: &ImagePayload,
    ) -> Result<String, RemoteError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    { "inline_data": {
                        "mime_type": image.mime_type,
                        "data": base64::engine::general_purpose::STANDARD.encode(&image.data),
                    } }
                ]
            }]
        });

        let response = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.base_url, model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| {
                    v.pointer("/error/message")
                        .and_then(|m| m.as_str())
                        .map(str::to_string)
                })
                .unwrap_or(text);
            return Err(RemoteError::status(status.as_u16(), message));
        }

        let json: Value =
            serde_json::from_str(&text).map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        parse_generate_response(&json)
    }
}

/// Join the text parts of the first candidate.
fn parse_generate_response(json: &Value) -> Result<String, RemoteError> {
    let candidate = json
        .pointer("/candidates/0")
        .ok_or_else(|| {
            let reason = json
                .pointer("/promptFeedback/blockReason")
                .and_then(|r| r.as_str())
                .unwrap_or("no candidates");
            RemoteError::InvalidResponse(format!("empty Gemini response: {}", reason))
        })?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| RemoteError::InvalidResponse("missing content parts".to_string()))?;

    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}
