//! # Generation Service Client
//!
//! Request/response client for the remote generative-language service. Every
//! piece of content in the application - topics, tests, feedback reports,
//! narration audio - comes from here; nothing is generated locally.
//!
//! ## Call Shapes:
//! - **Plain text**: topic generation
//! - **Structured JSON**: graded feedback and test generation, with a
//!   declared response schema so the service returns exactly the fields the
//!   caller's type expects; a response that doesn't match is a hard
//!   DecodeError for that call
//! - **Audio**: speech synthesis for listening tests, returned as raw PCM16
//!
//! All calls are single-attempt; failures surface to the caller, which keeps
//! its screen state and may retry.

use crate::audio::codec;
use crate::config::GeminiConfig;
use crate::error::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, error};

const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Client for the remote generation/grading service.
pub struct GeminiClient {
    http: reqwest::Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Model used for topics, test generation, and real-time feedback.
    pub fn text_model(&self) -> &str {
        &self.config.text_model
    }

    /// Model used for detailed evaluation reports.
    pub fn reasoning_model(&self) -> &str {
        &self.config.reasoning_model
    }

    /// Generate plain text from a prompt.
    pub async fn generate_text(&self, model: &str, prompt: &str) -> AppResult<String> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });

        let response = self.call(model, body).await?;
        let text = extract_text(&response)?;
        Ok(text.trim().to_string())
    }

    /// Generate a structured result conforming to the given response schema.
    ///
    /// The schema is declared to the service, which constrains its output;
    /// the returned JSON is then deserialized into the caller's type. Either
    /// step failing is a DecodeError - malformed JSON from the service is a
    /// hard failure for that call.
    pub async fn generate_json<T: DeserializeOwned>(
        &self,
        model: &str,
        prompt: &str,
        schema: Value,
    ) -> AppResult<T> {
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": 0,
                "responseMimeType": "application/json",
                "responseSchema": schema,
            },
        });

        let response = self.call(model, body).await?;
        let text = extract_text(&response)?;
        let parsed = serde_json::from_str(text.trim()).map_err(|e| {
            error!("Service returned JSON not matching the declared schema: {}", e);
            AppError::DecodeError(format!("Malformed structured response: {}", e))
        })?;
        Ok(parsed)
    }

    /// Synthesize speech for a narration script.
    ///
    /// Returns raw 16-bit PCM at 24kHz mono; the caller wraps it in a WAV
    /// container for the browser.
    pub async fn synthesize_speech(&self, script: &str) -> AppResult<Vec<u8>> {
        let body = json!({
            "contents": [{ "parts": [{ "text": script }] }],
            "generationConfig": {
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": { "voiceName": self.config.voice }
                    }
                },
            },
        });

        let response = self.call(&self.config.tts_model, body).await?;
        let data = response
            .pointer("/candidates/0/content/parts/0/inlineData/data")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                AppError::DecodeError("Synthesis response carried no audio payload".to_string())
            })?;

        codec::decode_base64(data)
    }

    /// Issue one generateContent call and return the raw response body.
    async fn call(&self, model: &str, body: Value) -> AppResult<Value> {
        if self.config.api_key.is_empty() {
            return Err(AppError::ConfigError(
                "No API key configured for the generation service".to_string(),
            ));
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            BASE_URL, model, self.config.api_key
        );

        debug!(model = %model, "Calling generation service");

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<Value>().await?)
    }
}

/// Pull the first text part out of a generateContent response.
fn extract_text(response: &Value) -> AppResult<&str> {
    response
        .pointer("/candidates/0/content/parts/0/text")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::DecodeError("Response carried no text content".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_text_from_response() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": " A topic. " }] } }]
        });
        assert_eq!(extract_text(&response).unwrap(), " A topic. ");
    }

    #[test]
    fn test_extract_text_missing_is_decode_error() {
        let response = json!({ "candidates": [] });
        assert!(matches!(
            extract_text(&response),
            Err(AppError::DecodeError(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_network() {
        let client = GeminiClient::new(GeminiConfig {
            api_key: String::new(),
            text_model: "m".to_string(),
            reasoning_model: "m".to_string(),
            live_model: "m".to_string(),
            tts_model: "m".to_string(),
            voice: "v".to_string(),
        });
        let result = client.generate_text("m", "prompt").await;
        assert!(matches!(result, Err(AppError::ConfigError(_))));
    }
}
