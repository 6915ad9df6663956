//! Generative-text collaborator.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::{json, Value};
use shelfmark_job_queue::JobError;
use std::time::Duration;

use crate::fetch::truncate;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(60);
const ERROR_BODY_SNIPPET_LEN: usize = 400;

/// Image bytes submitted inline alongside the prompt.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Prompt in, text out. The single opaque call the enrichment policy makes.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, images: &[InlineImage]) -> Result<String, JobError>;
}

/// Client for the Gemini `generateContent` endpoint.
pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    api_key: Option<String>,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            http,
            model: model.into(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, prompt: &str, images: &[InlineImage]) -> Result<String, JobError> {
        let key = self.api_key.as_deref().ok_or_else(|| {
            JobError::Configuration(
                "missing LLM API key (set SHELFMARK_LLM_API_KEY or GOOGLE_API_KEY)".into(),
            )
        })?;

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, key
        );

        let mut parts: Vec<Value> = vec![json!({ "text": prompt })];
        for image in images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.mime_type,
                    "data": base64::engine::general_purpose::STANDARD.encode(&image.bytes),
                }
            }));
        }

        let body = json!({
            "contents": [{ "role": "user", "parts": parts }],
            "generationConfig": { "temperature": 0.2, "maxOutputTokens": 2048 },
        });

        let response = self
            .http
            .post(&url)
            .timeout(GENERATE_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| JobError::Upstream(format!("model request failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| JobError::Upstream(format!("model response read failed: {e}")))?;

        if !status.is_success() {
            return Err(JobError::Upstream(format!(
                "model error: HTTP {} body={}",
                status.as_u16(),
                truncate(&text, ERROR_BODY_SNIPPET_LEN)
            )));
        }

        let root: Value = serde_json::from_str(&text)
            .map_err(|e| JobError::Upstream(format!("model returned invalid JSON envelope: {e}")))?;
        let generated = root
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty());

        match generated {
            Some(generated) => Ok(generated.to_string()),
            None => Err(JobError::Upstream("model returned empty response".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_a_configuration_error() {
        let client = GeminiClient::new(crate::fetch::default_http_client(), "gemini-2.5-flash", None);
        let err = client.generate("hello", &[]).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(matches!(err, JobError::Configuration(_)));
    }

    #[tokio::test]
    async fn blank_key_counts_as_missing() {
        let client = GeminiClient::new(
            crate::fetch::default_http_client(),
            "gemini-2.5-flash",
            Some("   ".into()),
        );
        let err = client.generate("hello", &[]).await.unwrap_err();
        assert!(matches!(err, JobError::Configuration(_)));
    }
}
